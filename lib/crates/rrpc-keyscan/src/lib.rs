pub mod engine;
pub mod error;

pub use engine::{KeyScanEngine, SearchInfo};
pub use error::KeyScanError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_matches_original_gateway_codes() {
        assert_eq!(KeyScanError::SearchIdNotFound("x".into()).http_status(), 404);
        assert_eq!(KeyScanError::WrongPageSize(0).http_status(), 400);
        assert_eq!(KeyScanError::WrongNumber(0).http_status(), 400);
        assert_eq!(
            KeyScanError::PageNotFound {
                search_id: "x".into(),
                count: 5,
                start: 10
            }
            .http_status(),
            404
        );
    }
}
