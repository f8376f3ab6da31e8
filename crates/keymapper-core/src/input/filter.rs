// Keymapper Input Layer - Device Filtering
// Device matching logic for autodetection and manual filtering

/// Check if a device matches the given filter criteria.
///
/// 1. If filter names are given, only devices matching by path or name
/// 2. Otherwise virtual devices and devices that cannot trigger are excluded
pub fn matches_device_filter(
    device_name: &str,
    device_path: &str,
    filter_names: &[String],
    is_trigger_source: bool,
    is_virtual: bool,
) -> bool {
    if !filter_names.is_empty() {
        return filter_names
            .iter()
            .any(|match_name| device_path == match_name || device_name == match_name);
    }

    !is_virtual && is_trigger_source
}
