//! Raw upload blob storage. The original bytes live only in S3; everything
//! downstream works from extracted text.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, error};
use uuid::Uuid;

use crate::cv::error::CvParseError;

/// Stores the uploaded document under a fresh key and returns it.
pub async fn store_upload(
    s3: &S3Client,
    bucket: &str,
    buffer: &[u8],
    mime_type: &str,
) -> Result<String, CvParseError> {
    let key = format!("cv-uploads/{}", Uuid::new_v4());

    s3.put_object()
        .bucket(bucket)
        .key(&key)
        .content_type(mime_type)
        .body(ByteStream::from(buffer.to_vec()))
        .send()
        .await
        .map_err(|e| {
            error!(error = %e, bucket, "upload blob store failed");
            CvParseError::storage_failed(&e.to_string())
        })?;

    debug!(key, size = buffer.len(), "upload stored");
    Ok(key)
}
