//! Tests for `src/telegram/media.rs` — filename handling.
//!
//! Note: `TelegramChat` needs a live Bot API connection and is exercised
//! through the dispatcher tests with a fake transport instead.

use mailwizard::telegram::media::{document_fallback_name, photo_file_name, sanitize_filename};

#[test]
fn sanitize_strips_path_separators() {
    // "../../../.env" → replace / with _ → ".._.._.._.env" → trim leading . → "_.._.._.env"
    assert_eq!(sanitize_filename("../../../.env"), "_.._.._.env");
}

#[test]
fn sanitize_strips_backslash_separators() {
    assert_eq!(sanitize_filename("..\\..\\secret.txt"), "_.._secret.txt");
}

#[test]
fn sanitize_strips_leading_dots() {
    assert_eq!(sanitize_filename(".hidden"), "hidden");
    assert_eq!(sanitize_filename("...triple"), "triple");
}

#[test]
fn sanitize_preserves_normal_filename() {
    assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
    assert_eq!(sanitize_filename("Q3 results (final).xlsx"), "Q3 results (final).xlsx");
}

#[test]
fn generated_names_are_timestamped() {
    let doc = document_fallback_name();
    assert!(doc.starts_with("doc_"));
    assert_eq!(doc.len(), "doc_20300101_120000".len());

    let photo = photo_file_name();
    assert!(photo.starts_with("photo_") && photo.ends_with(".jpg"));
}
