//! # Validation Rules
//!
//! Stateless field checks run by every create operation before it touches the
//! repository. Lengths count Unicode scalar values.

use crate::error::{AppError, Result};

pub const MAX_BOARD_ID_LEN: usize = 50;
pub const MAX_THREAD_TITLE_LEN: usize = 200;
pub const MAX_POST_TEXT_LEN: usize = 5000;
pub const MAX_BOARD_NAME_LEN: usize = 100;
pub const MAX_BOARD_DESCRIPTION_LEN: usize = 1000;

/// `^[A-Za-z0-9_-]+$`, at most 50 characters.
pub fn validate_board_id(board_id: &str) -> Result<()> {
    if board_id.is_empty() {
        return Err(AppError::Validation("board id must not be empty".into()));
    }
    if let Some(bad) = board_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(AppError::Validation(format!(
            "board id may only contain letters, digits, '_' and '-' (found '{bad}')"
        )));
    }
    max_len("board id", board_id, MAX_BOARD_ID_LEN)
}

pub fn validate_thread_title(title: &str) -> Result<()> {
    not_blank("thread title", title)?;
    max_len("thread title", title, MAX_THREAD_TITLE_LEN)
}

pub fn validate_post_text(text: &str) -> Result<()> {
    not_blank("post text", text)?;
    max_len("post text", text, MAX_POST_TEXT_LEN)
}

pub fn validate_board_name(name: &str) -> Result<()> {
    not_blank("board name", name)?;
    max_len("board name", name, MAX_BOARD_NAME_LEN)
}

pub fn validate_board_description(description: Option<&str>) -> Result<()> {
    match description {
        Some(text) => max_len("board description", text, MAX_BOARD_DESCRIPTION_LEN),
        None => Ok(()),
    }
}

fn not_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(AppError::Validation(format!(
            "{field} is {len} characters, the limit is {max}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_id_charset_and_length() {
        assert!(validate_board_id("abc-1_2").is_ok());
        assert!(validate_board_id("abc!").is_err());
        assert!(validate_board_id("").is_err());
        assert!(validate_board_id("has space").is_err());
        assert!(validate_board_id("ボード").is_err());
        assert!(validate_board_id(&"a".repeat(50)).is_ok());
        assert!(validate_board_id(&"a".repeat(51)).is_err());
    }

    #[test]
    fn thread_title_boundary() {
        assert!(validate_thread_title(&"t".repeat(200)).is_ok());
        let err = validate_thread_title(&"t".repeat(201)).unwrap_err();
        assert_eq!(
            err,
            AppError::Validation("thread title is 201 characters, the limit is 200".into())
        );
        assert!(validate_thread_title("   ").is_err());
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        // 200 three-byte characters
        assert!(validate_thread_title(&"あ".repeat(200)).is_ok());
    }

    #[test]
    fn post_text_boundary() {
        assert!(validate_post_text(&"p".repeat(5000)).is_ok());
        assert!(validate_post_text(&"p".repeat(5001)).is_err());
    }

    #[test]
    fn board_name_and_description_boundaries() {
        assert!(validate_board_name(&"n".repeat(100)).is_ok());
        assert!(validate_board_name(&"n".repeat(101)).is_err());
        assert!(validate_board_description(None).is_ok());
        assert!(validate_board_description(Some("")).is_ok());
        assert!(validate_board_description(Some(&"d".repeat(1000))).is_ok());
        assert!(validate_board_description(Some(&"d".repeat(1001))).is_err());
    }
}
