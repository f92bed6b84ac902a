pub mod extract;
pub mod handlers;

use aws_sdk_s3::{primitives::ByteStream, Client as S3Client};
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;

pub fn resume_s3_key(user_id: Uuid, resume_id: Uuid) -> String {
    format!("resumes/{user_id}/{resume_id}.pdf")
}

/// Stores the original upload; the extracted text lives in Postgres.
pub async fn store_original(
    s3: &S3Client,
    bucket: &str,
    key: &str,
    pdf: Bytes,
) -> Result<(), AppError> {
    s3.put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(pdf))
        .content_type("application/pdf")
        .send()
        .await
        .map_err(|e| AppError::S3(format!("upload of {key} failed: {e}")))?;

    info!("Uploaded resume to s3://{bucket}/{key}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_key_layout() {
        let user = Uuid::nil();
        let resume = Uuid::from_u128(7);
        assert_eq!(
            resume_s3_key(user, resume),
            format!("resumes/{user}/{resume}.pdf")
        );
    }
}
