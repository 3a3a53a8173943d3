use crate::filter::FilterState;

use super::store::{Prefs, PrefsError};

fn preset_name(name: &str) -> Result<String, PrefsError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PrefsError::EmptyName);
    }
    Ok(name.to_owned())
}

// ---------------------------------------------------------------------------
// Preset operations over `Prefs`
// ---------------------------------------------------------------------------

pub fn list(prefs: &Prefs) -> Vec<&str> {
    prefs.presets.keys().map(String::as_str).collect()
}

/// Capture `filter` under `name`, overwriting an existing preset.
pub fn save(prefs: &mut Prefs, name: &str, filter: &FilterState) -> Result<(), PrefsError> {
    let name = preset_name(name)?;
    prefs.presets.insert(name.clone(), filter.clone());
    prefs.active_preset = Some(name);
    Ok(())
}

/// Atomically replace the live filter with the preset. Returns the new filter.
pub fn apply(prefs: &mut Prefs, name: &str) -> Result<FilterState, PrefsError> {
    let name = preset_name(name)?;
    let mut filter = prefs
        .presets
        .get(&name)
        .cloned()
        .ok_or_else(|| PrefsError::UnknownPreset(name.clone()))?;
    filter.normalize();
    prefs.filter = filter.clone();
    prefs.active_preset = Some(name);
    Ok(filter)
}

/// Delete a preset. Deleting the active one requires `confirmed`.
pub fn delete(prefs: &mut Prefs, name: &str, confirmed: bool) -> Result<(), PrefsError> {
    let name = preset_name(name)?;
    if !prefs.presets.contains_key(&name) {
        return Err(PrefsError::UnknownPreset(name));
    }
    let is_active = prefs.active_preset.as_deref() == Some(name.as_str());
    if is_active && !confirmed {
        return Err(PrefsError::ConfirmationRequired(name));
    }
    prefs.presets.remove(&name);
    if is_active {
        prefs.active_preset = None;
    }
    Ok(())
}

/// Import a preset from a hand-written or exported JSON filter.
pub fn import(prefs: &mut Prefs, name: &str, json: &str) -> Result<(), PrefsError> {
    let name = preset_name(name)?;
    let mut filter: FilterState = serde_json::from_str(json)?;
    filter.normalize();
    prefs.presets.insert(name, filter);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Family;

    fn bans_only() -> FilterState {
        let mut f = FilterState::default();
        f.set_families([Family::Bans]);
        f.group_by_mod = true;
        f
    }

    #[test]
    fn save_then_apply_replaces_live_filter() {
        let mut prefs = Prefs::default();
        save(&mut prefs, " bans ", &bans_only()).unwrap();
        prefs.filter = FilterState::default();
        let applied = apply(&mut prefs, "bans").unwrap();
        assert_eq!(applied, bans_only());
        assert_eq!(prefs.filter, bans_only());
        assert_eq!(prefs.active_preset.as_deref(), Some("bans"));
        assert_eq!(list(&prefs), vec!["bans"]);
    }

    #[test]
    fn saving_same_name_overwrites() {
        let mut prefs = Prefs::default();
        save(&mut prefs, "p", &FilterState::default()).unwrap();
        save(&mut prefs, "p", &bans_only()).unwrap();
        assert_eq!(prefs.presets.len(), 1);
        assert_eq!(prefs.presets["p"], bans_only());
    }

    #[test]
    fn deleting_active_preset_needs_confirmation() {
        let mut prefs = Prefs::default();
        save(&mut prefs, "p", &bans_only()).unwrap();
        assert!(matches!(
            delete(&mut prefs, "p", false),
            Err(PrefsError::ConfirmationRequired(_))
        ));
        assert!(prefs.presets.contains_key("p"));
        delete(&mut prefs, "p", true).unwrap();
        assert!(prefs.presets.is_empty());
        assert_eq!(prefs.active_preset, None);
    }

    #[test]
    fn deleting_inactive_preset_needs_no_confirmation() {
        let mut prefs = Prefs::default();
        save(&mut prefs, "a", &bans_only()).unwrap();
        save(&mut prefs, "b", &bans_only()).unwrap();
        delete(&mut prefs, "a", false).unwrap();
        assert_eq!(list(&prefs), vec!["b"]);
    }

    #[test]
    fn unknown_and_empty_names_are_rejected() {
        let mut prefs = Prefs::default();
        assert!(matches!(
            apply(&mut prefs, "missing"),
            Err(PrefsError::UnknownPreset(_))
        ));
        assert!(matches!(
            save(&mut prefs, "  ", &bans_only()),
            Err(PrefsError::EmptyName)
        ));
    }

    #[test]
    fn malformed_import_is_a_parse_error() {
        let mut prefs = Prefs::default();
        assert!(matches!(
            import(&mut prefs, "x", r#"{ "orderDesc": "yes" }"#),
            Err(PrefsError::Parse(_))
        ));
        import(&mut prefs, "y", r#"{ "family": "voice" }"#).unwrap();
        assert!(prefs.presets["y"].families.contains(&Family::Voice));
    }
}
