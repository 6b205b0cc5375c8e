use std::future::Future;

use crate::api::{self, ApiError};
use crate::models::{NewLocation, Provider, ProviderLocation};

use super::error::ResolverError;

/// Supplies providers and their registered locations.
pub trait LocationResolver: Send + Sync {
    fn list_providers(&self) -> impl Future<Output = Result<Vec<Provider>, ApiError>> + Send;

    fn list_locations(
        &self,
        provider_id: i64,
    ) -> impl Future<Output = Result<Vec<ProviderLocation>, ApiError>> + Send;

    fn create_location(
        &self,
        provider_id: i64,
        data: &NewLocation,
    ) -> impl Future<Output = Result<ProviderLocation, ApiError>> + Send;
}

/// Resolver backed by the inventory API.
#[derive(Clone)]
pub struct ApiLocationResolver {
    client: reqwest::Client,
    api_base_url: String,
    api_token: String,
}

impl ApiLocationResolver {
    pub fn new(client: reqwest::Client, api_base_url: &str, api_token: &str) -> Self {
        Self {
            client,
            api_base_url: api_base_url.to_string(),
            api_token: api_token.to_string(),
        }
    }
}

impl LocationResolver for ApiLocationResolver {
    fn list_providers(&self) -> impl Future<Output = Result<Vec<Provider>, ApiError>> + Send {
        api::load_providers(&self.client, &self.api_base_url, &self.api_token)
    }

    fn list_locations(
        &self,
        provider_id: i64,
    ) -> impl Future<Output = Result<Vec<ProviderLocation>, ApiError>> + Send {
        api::load_locations(&self.client, &self.api_base_url, &self.api_token, provider_id)
    }

    fn create_location(
        &self,
        provider_id: i64,
        data: &NewLocation,
    ) -> impl Future<Output = Result<ProviderLocation, ApiError>> + Send {
        let data = data.clone();
        async move {
            api::create_location(
                &self.client,
                &self.api_base_url,
                &self.api_token,
                provider_id,
                &data,
            )
            .await
        }
    }
}

/// Provider and location selection for one install form.
///
/// Changing the provider clears the chosen location; an inline creation
/// that succeeds becomes the chosen location right away.
#[derive(Debug, Clone, Default)]
pub struct LocationPicker {
    providers: Vec<Provider>,
    provider: Option<Provider>,
    locations: Vec<ProviderLocation>,
    selected: Option<ProviderLocation>,
    last_error: Option<String>,
}

impl LocationPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn provider(&self) -> Option<&Provider> {
        self.provider.as_ref()
    }

    pub fn locations(&self) -> &[ProviderLocation] {
        &self.locations
    }

    pub fn location(&self) -> Option<&ProviderLocation> {
        self.selected.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn record<T>(&mut self, result: Result<T, ResolverError>) -> Result<T, ResolverError> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => {
                tracing::warn!(error = %e, "location resolver failed");
                self.last_error = Some(e.to_string());
            }
        }
        result
    }

    pub async fn load_providers<R: LocationResolver>(
        &mut self,
        resolver: &R,
    ) -> Result<&[Provider], ResolverError> {
        let result = resolver.list_providers().await.map_err(ResolverError::from);
        self.providers = self.record(result)?;
        Ok(&self.providers)
    }

    /// Choose a provider and load its locations.
    pub async fn select_provider<R: LocationResolver>(
        &mut self,
        resolver: &R,
        provider_id: i64,
    ) -> Result<&[ProviderLocation], ResolverError> {
        if self.providers.is_empty() {
            self.load_providers(resolver).await?;
        }
        self.selected = None;
        self.locations.clear();
        let Some(provider) = self.providers.iter().find(|p| p.id == provider_id).cloned() else {
            self.provider = None;
            return self.record(Err(ResolverError::UnknownProvider(provider_id)));
        };
        self.provider = Some(provider);
        let result = resolver.list_locations(provider_id).await.map_err(ResolverError::from);
        self.locations = self.record(result)?;
        Ok(&self.locations)
    }

    pub fn select_location(
        &mut self,
        location_id: i64,
    ) -> Result<&ProviderLocation, ResolverError> {
        let found = self.locations.iter().find(|l| l.id == location_id).cloned();
        let result = found.ok_or(ResolverError::UnknownLocation(location_id));
        let chosen = self.record(result)?;
        let selected = self.selected.insert(chosen);
        Ok(&*selected)
    }

    /// Persist a new location under the chosen provider and select it.
    pub async fn create_location<R: LocationResolver>(
        &mut self,
        resolver: &R,
        data: &NewLocation,
    ) -> Result<&ProviderLocation, ResolverError> {
        let Some(provider_id) = self.provider.as_ref().map(|p| p.id) else {
            return self.record(Err(ResolverError::NoProviderSelected));
        };
        self.selected = None;
        let result = resolver
            .create_location(provider_id, data)
            .await
            .map_err(ResolverError::from);
        let created = self.record(result)?;
        self.locations.push(created.clone());
        tracing::info!(provider_id, location_id = created.id, "location created and selected");
        let selected = self.selected.insert(created);
        Ok(&*selected)
    }
}
