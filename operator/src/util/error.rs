use crate::results::ResultsError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("Invalid user input: {0}")]
    UserInput(String),

    #[error("Json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Yaml error: {source}")]
    Yaml {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("Template error: {source}")]
    Template {
        #[from]
        source: minijinja::Error,
    },

    #[error(transparent)]
    Results {
        #[from]
        source: ResultsError,
    },
}

impl Error {
    /// The HTTP status code reported by the API server, if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Kube {
                source: kube::Error::Api(ae),
            } => Some(ae.code),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(409)
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Whether this error is a permanent benchmark failure rather than
    /// something worth retrying.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Error::UserInput(_)
                | Error::Results {
                    source: ResultsError::Format(_),
                }
        )
    }

    /// Whether this error indicates that results are not fully observed yet.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            Error::Results {
                source: ResultsError::Incomplete(_),
            }
        )
    }
}
