use super::ApiError;
use axum::{
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use bytes::Bytes;
use cacd_core::CacdError;

/// An uploaded file, sent either as the raw request body or as the first
/// file field of a multipart form
pub struct FileUpload(pub Bytes);

impl<S> FromRequest<S> for FileUpload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        let data = if is_multipart {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| CacdError::invalid(e.body_text()))?;
            let mut found = None;
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| CacdError::invalid(e.body_text()))?
            {
                if field.file_name().is_some() || field.name() == Some("file") {
                    found = Some(
                        field
                            .bytes()
                            .await
                            .map_err(|e| CacdError::invalid(e.body_text()))?,
                    );
                    break;
                }
            }
            found.ok_or_else(|| CacdError::invalid("multipart body has no file field"))?
        } else {
            Bytes::from_request(req, state)
                .await
                .map_err(|e| CacdError::invalid(e.body_text()))?
        };

        if data.is_empty() {
            return Err(CacdError::invalid("empty upload").into());
        }
        Ok(Self(data))
    }
}
