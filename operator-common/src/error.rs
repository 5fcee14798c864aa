use log::{log, Level};
use thiserror::Error;

/// An error talking to the orchestration backend.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Resource was modified concurrently: {0}")]
    Conflict(String),
    #[error("Backend request failed: {0}")]
    Backend(String),
}

impl ResourceError {
    pub fn backend<S: ToString>(s: S) -> Self {
        Self::Backend(s.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn log(self, level: Level) -> Self {
        log!(level, "{self}");
        self
    }
}

impl From<kube::Error> for ResourceError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) if response.code == 404 => Self::NotFound(response.message),
            kube::Error::Api(response) if response.code == 409 => Self::Conflict(response.message),
            err => Self::backend(err),
        }
    }
}

impl From<serde_json::Error> for ResourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::backend(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: format!("failed with {code}"),
            reason: "Test".into(),
            code,
        })
    }

    #[test]
    fn test_map_kube_errors() {
        assert_eq!(
            ResourceError::from(api_error(404)),
            ResourceError::NotFound("failed with 404".into())
        );
        assert_eq!(
            ResourceError::from(api_error(409)),
            ResourceError::Conflict("failed with 409".into())
        );
        assert!(matches!(
            ResourceError::from(api_error(500)),
            ResourceError::Backend(_)
        ));
    }
}
