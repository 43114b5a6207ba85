//! # Identifier Codec
//!
//! URL-safe tokens for resource URIs and deterministic reaction record keys.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::error::{AppError, Result};
use crate::models::ReactionKind;

/// Accepts tokens with or without their trailing `=` padding.
const ROUTE_TOKEN_DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encodes a resource URI into a token safe for a single path segment.
pub fn encode_route_token(uri: &str) -> String {
    URL_SAFE_NO_PAD.encode(uri.as_bytes())
}

/// Inverse of [`encode_route_token`].
///
/// Standard-alphabet input (`+`, `/`) is normalized first, and missing padding
/// is restored from the token length.
pub fn decode_route_token(token: &str) -> Result<String> {
    let mut normalized: String = token
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    match normalized.len() % 4 {
        0 => {}
        1 => {
            return Err(AppError::Decode(format!(
                "route token '{token}' has an impossible length"
            )))
        }
        rem => normalized.push_str(&"=".repeat(4 - rem)),
    }

    let bytes = ROUTE_TOKEN_DECODER
        .decode(normalized.as_bytes())
        .map_err(|e| AppError::Decode(format!("route token '{token}': {e}")))?;
    String::from_utf8(bytes)
        .map_err(|_| AppError::Decode(format!("route token '{token}' is not UTF-8")))
}

/// Record key for the reaction of `actor_id` to `subject_uri`.
///
/// One key per (subject, kind, actor) triple, so writing it again overwrites.
pub fn build_reaction_key(subject_uri: &str, kind: ReactionKind, actor_id: &str) -> String {
    let composite = format!("{subject_uri}|{}|{actor_id}", kind.as_str());
    URL_SAFE_NO_PAD.encode(composite.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREAD_URI: &str = "at://did:plc:abc123/app.echosky.board.thread/3kxyz";

    #[test]
    fn route_token_round_trips() {
        for uri in [
            THREAD_URI,
            "at://did:web:example.com/app.echosky.board.post/a?b=c&d=e",
            "a",
            "ab",
            "abc",
            "",
            "at://did:plc:日本語/スレッド",
        ] {
            let token = encode_route_token(uri);
            assert!(!token.contains(['+', '/', '=']), "unsafe token {token}");
            assert_eq!(decode_route_token(&token).unwrap(), uri);
        }
    }

    #[test]
    fn decode_accepts_padded_and_standard_alphabet_tokens() {
        // "?>?" encodes to "Pz4/" in the standard alphabet.
        assert_eq!(decode_route_token("Pz4/").unwrap(), "?>?");
        assert_eq!(decode_route_token("Pz4_").unwrap(), "?>?");
        assert_eq!(decode_route_token("YQ==").unwrap(), "a");
        assert_eq!(decode_route_token("YQ").unwrap(), "a");
    }

    #[test]
    fn decode_rejects_malformed_tokens() {
        assert!(matches!(decode_route_token("ab!c"), Err(AppError::Decode(_))));
        assert!(matches!(decode_route_token("abcde"), Err(AppError::Decode(_))));
        // 0xff is not valid UTF-8
        assert!(matches!(decode_route_token("_w"), Err(AppError::Decode(_))));
    }

    #[test]
    fn reaction_key_is_deterministic() {
        let a = build_reaction_key(THREAD_URI, ReactionKind::Like, "did:plc:me");
        let b = build_reaction_key(THREAD_URI, ReactionKind::Like, "did:plc:me");
        assert_eq!(a, b);
        assert_eq!(
            decode_route_token(&a).unwrap(),
            format!("{THREAD_URI}|like|did:plc:me")
        );
    }

    #[test]
    fn reaction_key_changes_with_each_input() {
        let base = build_reaction_key(THREAD_URI, ReactionKind::Like, "did:plc:me");
        let other_subject =
            build_reaction_key("at://did:plc:abc123/app.echosky.board.post/1", ReactionKind::Like, "did:plc:me");
        let other_kind = build_reaction_key(THREAD_URI, ReactionKind::Star, "did:plc:me");
        let other_actor = build_reaction_key(THREAD_URI, ReactionKind::Like, "did:plc:you");
        assert_ne!(base, other_subject);
        assert_ne!(base, other_kind);
        assert_ne!(base, other_actor);
    }
}
