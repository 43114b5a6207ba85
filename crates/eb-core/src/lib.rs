//! echo-board/crates/eb-core/src/lib.rs
//!
//! Record models, port traits, identifier codec and validation rules shared by
//! every echo-board crate.

pub mod codec;
pub mod error;
pub mod models;
pub mod session;
pub mod traits;
pub mod validation;

// Re-exporting for easier access in other crates
pub use codec::*;
pub use error::*;
pub use models::*;
pub use session::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_thread_record_wire_shape() {
        let thread = ThreadRecord {
            title: "Hello Rust!".to_string(),
            board: Some("rust".to_string()),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };
        let value = thread.to_value().unwrap();
        assert_eq!(value["$type"], "app.echosky.board.thread");
        assert_eq!(value["createdAt"], "2024-05-01T12:00:00Z");

        let back = ThreadRecord::from_value(value).unwrap();
        assert_eq!(back, thread);
    }
}
