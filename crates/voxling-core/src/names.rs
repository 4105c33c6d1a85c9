//! Generated names for stored media files.

use chrono::Local;
use uuid::Uuid;

/// `{prefix}_{YYYYMMDD_HHMMSS}_{id8}.{ext}` — unique enough for
/// concurrently-running turns, sortable by creation time.
pub fn unique_media_filename(prefix: &str, ext: &str) -> String {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{stamp}_{}.{ext}", &id[..8])
}
