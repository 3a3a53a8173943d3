use modfeed::feed::RecencyWindow;
use modfeed::filter::{Family, FilterState};
use modfeed::prefs::{PrefStore, PrefsError, presets};

fn bans_only() -> FilterState {
    let mut filter = FilterState::default();
    filter.set_families([Family::Bans]);
    filter
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = PrefStore::open(dir.path().join("prefs.json")).unwrap();
    assert_eq!(store.prefs().filter, FilterState::default());
    assert!(store.prefs().always_dry_run);
    assert!(store.prefs().presets.is_empty());
}

#[test]
fn filter_and_toggles_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/prefs.json");

    let mut store = PrefStore::open(&path).unwrap();
    store.set_filter(&bans_only()).unwrap();
    store
        .update(|p| {
            p.always_dry_run = false;
            p.recency_window = Some(RecencyWindow::Hour);
            Ok(())
        })
        .unwrap();

    let reopened = PrefStore::open(&path).unwrap();
    assert_eq!(reopened.prefs().filter, bans_only());
    assert!(!reopened.prefs().always_dry_run);
    assert_eq!(reopened.prefs().recency_window, Some(RecencyWindow::Hour));
}

#[test]
fn corrupted_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(PrefStore::open(&path), Err(PrefsError::Parse(_))));
    let store = PrefStore::open_or_default(&path);
    assert_eq!(store.prefs().filter, FilterState::default());
    assert_eq!(store.path(), Some(path.as_path()));
}

#[test]
fn presets_persist_and_apply_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.json");

    let mut store = PrefStore::open(&path).unwrap();
    store
        .update(|p| presets::save(p, "bans", &bans_only()))
        .unwrap();
    store.set_filter(&FilterState::default()).unwrap();

    let mut store = PrefStore::open(&path).unwrap();
    assert_eq!(presets::list(store.prefs()), vec!["bans"]);
    let applied = store.update(|p| presets::apply(p, "bans")).unwrap();
    assert_eq!(applied, bans_only());

    let reopened = PrefStore::open(&path).unwrap();
    assert_eq!(reopened.prefs().filter, bans_only());
    assert_eq!(reopened.prefs().active_preset.as_deref(), Some("bans"));
}

#[test]
fn deleting_the_active_preset_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.json");

    let mut store = PrefStore::open(&path).unwrap();
    store
        .update(|p| presets::save(p, "bans", &bans_only()))
        .unwrap();

    let err = store
        .update(|p| presets::delete(p, "bans", false))
        .unwrap_err();
    assert!(matches!(err, PrefsError::ConfirmationRequired(_)));
    // The failed update must not have been written.
    let reopened = PrefStore::open(&path).unwrap();
    assert_eq!(presets::list(reopened.prefs()), vec!["bans"]);

    store.update(|p| presets::delete(p, "bans", true)).unwrap();
    let reopened = PrefStore::open(&path).unwrap();
    assert!(presets::list(reopened.prefs()).is_empty());
    assert!(reopened.prefs().active_preset.is_none());
}
