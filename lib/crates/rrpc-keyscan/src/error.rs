//! Errors specific to key-scan pagination, each carrying the HTTP status the
//! original gateway returned for it.

#[derive(Debug, thiserror::Error)]
pub enum KeyScanError {
    #[error("search identifier `{0}` is not present in service redis")]
    SearchIdNotFound(String),

    #[error("page size must be a positive integer but you passed {0}")]
    WrongPageSize(i64),

    #[error("page number must be an integer >= 1 but you passed {0}")]
    WrongNumber(i64),

    #[error("search `{search_id}` has {count} items, but you requested a slice starting at {start}")]
    PageNotFound {
        search_id: String,
        count: i64,
        start: i64,
    },

    #[error(transparent)]
    Redis(#[from] rrpc_common::RpcError),
}

impl KeyScanError {
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::SearchIdNotFound(_) | Self::PageNotFound { .. } => 404,
            Self::WrongPageSize(_) | Self::WrongNumber(_) => 400,
            Self::Redis(_) => 500,
        }
    }

    #[must_use]
    pub fn into_rpc_error(self) -> rrpc_common::RpcError {
        match self {
            Self::Redis(e) => e,
            Self::SearchIdNotFound(_) | Self::PageNotFound { .. } => {
                rrpc_common::RpcError::generic(self.to_string())
            }
            Self::WrongPageSize(_) | Self::WrongNumber(_) => {
                rrpc_common::RpcError::invalid_params(self.to_string())
            }
        }
    }
}
