//! PDF text extraction for uploaded résumés.

use bytes::Bytes;

use crate::errors::AppError;

const PDF_MAGIC: &[u8] = b"%PDF";

/// True when the payload starts with the PDF header.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Extracts plain text from a PDF on the blocking pool.
/// A document without any extractable text is a 422.
pub async fn extract_resume_text(pdf: Bytes) -> Result<String, AppError> {
    let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&pdf))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("PDF extraction task failed: {e}")))?
        .map_err(|e| AppError::UnprocessableEntity(format!("Could not read PDF: {e}")))?;

    let text = normalize_whitespace(&raw);
    if text.is_empty() {
        return Err(AppError::UnprocessableEntity(
            "No text could be extracted from this PDF".to_string(),
        ));
    }
    Ok(text)
}

/// Collapses runs of spaces/tabs within a line and drops blank lines.
pub fn normalize_whitespace(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_magic_detection() {
        assert!(looks_like_pdf(b"%PDF-1.7\n..."));
        assert!(!looks_like_pdf(b"PK\x03\x04 docx"));
        assert!(!looks_like_pdf(b""));
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let raw = "  Jane   Doe \n\n\n Senior\tEngineer  \n   \n Rust,  Go ";
        assert_eq!(normalize_whitespace(raw), "Jane Doe\nSenior Engineer\nRust, Go");
    }

    #[test]
    fn test_blank_document_normalizes_to_empty() {
        assert_eq!(normalize_whitespace(" \n\t\n  "), "");
    }
}
