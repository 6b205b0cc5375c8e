mod common;

use std::future::{ready, Future};
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{acme, bucharest, valid_form};
use fleetdesk::api::ApiError;
use fleetdesk::models::{NewLocation, Provider, ProviderLocation};
use fleetdesk::provision::{validate_install_form, LocationPicker, LocationResolver, ResolverError};

#[derive(Default)]
struct FakeResolver {
    providers: Vec<Provider>,
    locations: Vec<ProviderLocation>,
    reject_create: Option<String>,
    provider_loads: AtomicUsize,
}

impl FakeResolver {
    fn acme() -> Self {
        FakeResolver {
            providers: vec![acme(), Provider { id: 2, name: "Globex".into() }],
            locations: vec![bucharest()],
            ..Default::default()
        }
    }
}

impl LocationResolver for FakeResolver {
    fn list_providers(&self) -> impl Future<Output = Result<Vec<Provider>, ApiError>> + Send {
        self.provider_loads.fetch_add(1, Ordering::SeqCst);
        ready(Ok::<_, ApiError>(self.providers.clone()))
    }

    fn list_locations(
        &self,
        provider_id: i64,
    ) -> impl Future<Output = Result<Vec<ProviderLocation>, ApiError>> + Send {
        let found: Vec<ProviderLocation> = self
            .locations
            .iter()
            .filter(|l| l.provider_id == provider_id)
            .cloned()
            .collect();
        ready(Ok::<_, ApiError>(found))
    }

    fn create_location(
        &self,
        provider_id: i64,
        data: &NewLocation,
    ) -> impl Future<Output = Result<ProviderLocation, ApiError>> + Send {
        let result: Result<ProviderLocation, ApiError> = match &self.reject_create {
            Some(detail) => Err(ApiError::Rejected(detail.clone())),
            None => Ok(ProviderLocation {
                id: 99,
                provider_id,
                continent: data.continent.clone(),
                country: data.country.clone(),
                country_code: data.country_code.clone(),
                state: data.state.clone(),
                city: data.city.clone(),
                data_center: data.data_center.clone(),
                latitude: data.latitude,
                longitude: data.longitude,
            }),
        };
        ready(result)
    }
}

fn cluj() -> NewLocation {
    NewLocation {
        continent: "Europe".into(),
        country: "Romania".into(),
        country_code: "RO".into(),
        state: Some("Cluj".into()),
        city: "Cluj-Napoca".into(),
        data_center: "CLJ1".into(),
        latitude: 46.77,
        longitude: 23.59,
    }
}

#[tokio::test]
async fn test_select_provider_loads_providers_once_and_its_locations() {
    let resolver = FakeResolver::acme();
    let mut picker = LocationPicker::new();

    let locations = picker.select_provider(&resolver, 1).await.unwrap();
    assert_eq!(locations, &[bucharest()][..]);
    assert_eq!(picker.provider(), Some(&acme()));
    assert_eq!(picker.providers().len(), 2);

    picker.select_provider(&resolver, 2).await.unwrap();
    assert_eq!(resolver.provider_loads.load(Ordering::SeqCst), 1);
    assert!(picker.locations().is_empty());
}

#[tokio::test]
async fn test_changing_provider_clears_selected_location() {
    let resolver = FakeResolver::acme();
    let mut picker = LocationPicker::new();
    picker.select_provider(&resolver, 1).await.unwrap();
    picker.select_location(7).unwrap();
    assert_eq!(picker.location().map(|l| l.id), Some(7));

    picker.select_provider(&resolver, 2).await.unwrap();
    assert!(picker.location().is_none());
}

#[tokio::test]
async fn test_unknown_provider_and_location_are_reported() {
    let resolver = FakeResolver::acme();
    let mut picker = LocationPicker::new();

    let err = picker.select_provider(&resolver, 404).await.unwrap_err();
    assert!(matches!(err, ResolverError::UnknownProvider(404)));
    assert!(picker.provider().is_none());
    assert_eq!(picker.last_error(), Some("Unknown provider 404"));

    picker.select_provider(&resolver, 1).await.unwrap();
    assert!(picker.last_error().is_none());
    assert!(matches!(picker.select_location(8), Err(ResolverError::UnknownLocation(8))));
    assert!(picker.location().is_none());
}

#[tokio::test]
async fn test_created_location_becomes_selection() {
    let resolver = FakeResolver::acme();
    let mut picker = LocationPicker::new();

    let err = picker.create_location(&resolver, &cluj()).await.unwrap_err();
    assert!(matches!(err, ResolverError::NoProviderSelected));

    picker.select_provider(&resolver, 1).await.unwrap();
    let created = picker.create_location(&resolver, &cluj()).await.unwrap();
    assert_eq!(created.id, 99);
    assert_eq!(created.provider_id, 1);
    assert_eq!(picker.location().map(|l| l.city.as_str()), Some("Cluj-Napoca"));
    assert_eq!(picker.locations().len(), 2);

    // The fresh selection is immediately usable for a request.
    let request =
        validate_install_form(&valid_form(), picker.provider(), picker.location()).unwrap();
    assert_eq!(request.location.id, 99);
    assert_eq!(request.location.coordinates(), "46.77,23.59");
}

#[tokio::test]
async fn test_failed_creation_leaves_selection_empty() {
    let resolver = FakeResolver {
        reject_create: Some("Location already exists".into()),
        ..FakeResolver::acme()
    };
    let mut picker = LocationPicker::new();
    picker.select_provider(&resolver, 1).await.unwrap();
    picker.select_location(7).unwrap();

    let err = picker.create_location(&resolver, &cluj()).await.unwrap_err();
    assert_eq!(err.to_string(), "API rejected the request: Location already exists");
    assert!(picker.location().is_none());
    assert_eq!(picker.last_error(), Some("API rejected the request: Location already exists"));
    assert_eq!(picker.locations().len(), 1);
}
