use crate::types::Domain;

/// iCloud web endpoints used after sign-in, per regional domain.
#[derive(Debug, Clone, Copy)]
pub struct Endpoints {
    pub home: &'static str,
    pub setup: &'static str,
}

impl Endpoints {
    pub fn for_domain(domain: Domain) -> Self {
        match domain {
            Domain::Com => Self {
                home: "https://www.icloud.com",
                setup: "https://setup.icloud.com/setup/ws/1",
            },
            Domain::Cn => Self {
                home: "https://www.icloud.com.cn",
                setup: "https://setup.icloud.com.cn/setup/ws/1",
            },
        }
    }

    pub fn validate_url(&self) -> String {
        format!("{}/validate", self.setup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regional_endpoints() {
        assert_eq!(
            Endpoints::for_domain(Domain::Com).validate_url(),
            "https://setup.icloud.com/setup/ws/1/validate"
        );
        assert_eq!(Endpoints::for_domain(Domain::Cn).home, "https://www.icloud.com.cn");
    }
}
