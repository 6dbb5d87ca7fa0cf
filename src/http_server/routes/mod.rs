pub mod connections;
pub mod jobs;
pub mod music;
pub mod notifications;
pub mod playlists;

use crate::ports::provider::ProviderKind;
use crate::services::error::ServiceError;

/// Parse the public spelling of a provider name (`spotify`, `appleMusic`,
/// `amazonMusic`) out of a path segment or request body.
pub(crate) fn parse_provider(value: &str) -> Result<ProviderKind, ServiceError> {
    ProviderKind::parse_api(value)
        .filter(|kind| *kind != ProviderKind::Custom)
        .ok_or_else(|| ServiceError::invalid_input(format!("Valid service is required, got '{value}'")))
}
