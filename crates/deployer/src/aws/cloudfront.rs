use super::classify;
use crate::error::PortError;
use crate::ports::{CdnInvalidator, InvalidationReceipt, InvalidationRequest};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudfront::Client;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};

/// [`CdnInvalidator`] backed by Amazon CloudFront
#[derive(Debug, Clone)]
pub struct CloudFrontInvalidator {
    client: Client,
}

impl CloudFrontInvalidator {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl CdnInvalidator for CloudFrontInvalidator {
    async fn create_invalidation(
        &self,
        request: &InvalidationRequest,
    ) -> Result<InvalidationReceipt, PortError> {
        let paths = Paths::builder()
            .quantity(request.paths.len() as i32)
            .set_items(Some(request.paths.clone()))
            .build()
            .map_err(|e| PortError::rejected(format!("CreateInvalidation: {}", e)))?;
        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(&request.caller_reference)
            .build()
            .map_err(|e| PortError::rejected(format!("CreateInvalidation: {}", e)))?;

        let output = self
            .client
            .create_invalidation()
            .distribution_id(&request.distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| classify("CreateInvalidation", e))?;

        let invalidation = output
            .invalidation()
            .ok_or_else(|| PortError::rejected("CreateInvalidation returned no invalidation"))?;
        Ok(InvalidationReceipt {
            id: invalidation.id().to_string(),
            status: invalidation.status().to_string(),
        })
    }

    async fn invalidation_status(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> Result<String, PortError> {
        let output = self
            .client
            .get_invalidation()
            .distribution_id(distribution_id)
            .id(invalidation_id)
            .send()
            .await
            .map_err(|e| classify("GetInvalidation", e))?;

        output
            .invalidation()
            .map(|i| i.status().to_string())
            .ok_or_else(|| PortError::rejected("GetInvalidation returned no invalidation"))
    }
}
