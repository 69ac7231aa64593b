#![allow(dead_code)]

use std::sync::Arc;

use imaging_hub::conf::AppSettings;
use imaging_hub::identity::{CurrentUser, Role};
use imaging_hub::modules::directory::models::ImageRecord;
use imaging_hub::state::AppState;
use imaging_hub::store::MemoryStore;

/// 两家医院、若干医生与一张 H1 影像 / Two hospitals, a few doctors, one H1 image
pub fn seeded_store(h1_endpoint: &str, h2_endpoint: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_hospital("h1", Some(h1_endpoint));
    store.add_hospital("h2", Some(h2_endpoint));
    store.add_hospital("h3", None);
    store.add_user("doc-a", Role::Doctor, Some("h1"));
    store.add_user("doc-a2", Role::Doctor, Some("h1"));
    store.add_user("doc-b", Role::Doctor, Some("h2"));
    store.add_user("doc-c", Role::Doctor, Some("h2"));
    store.add_user("doc-d", Role::Doctor, Some("h2"));
    store.add_user("doc-x", Role::Doctor, Some("h3"));
    store.add_user("nurse-1", Role::Nurse, Some("h1"));
    store.add_user("pat-1", Role::Patient, None);
    store.add_image(ImageRecord {
        id: "img-001".to_string(),
        owner_hospital_id: "h1".to_string(),
        archive_native_id: "abc123".to_string(),
        medical_record_id: Some("mr-9".to_string()),
        description: Some("chest CT".to_string()),
    });
    store
}

pub fn state_with(store: Arc<MemoryStore>, settings: AppSettings) -> AppState {
    AppState::assemble(settings, store).expect("state")
}

pub fn state() -> (Arc<MemoryStore>, AppState) {
    let store = seeded_store("http://127.0.0.1:9", "http://127.0.0.1:9");
    let state = state_with(store.clone(), AppSettings::default());
    (store, state)
}

pub fn doctor(id: &str) -> CurrentUser {
    CurrentUser::new(id, Role::Doctor)
}
