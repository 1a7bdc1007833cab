//! Camera directory.
//!
//! A static registry of camera identities consumed by the pipeline (for the
//! location string sent with inference requests) and by the dashboard
//! shell. The directory is a plain collaborator: record lookup and listing
//! only, no algorithmic behavior.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Active,
    Offline,
    Error,
}

#[derive(Clone, Debug, Serialize)]
pub struct CameraRecord {
    pub id: String,
    pub location: String,
    pub status: CameraStatus,
    /// Milliseconds since the Unix epoch.
    pub last_update_ms: u64,
}

impl CameraRecord {
    pub fn new(id: &str, location: &str, status: CameraStatus, last_update_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            location: location.to_string(),
            status,
            last_update_ms,
        }
    }
}

/// Ordered camera registry.
pub struct CameraDirectory {
    cameras: Vec<CameraRecord>,
}

impl CameraDirectory {
    pub fn new(cameras: Vec<CameraRecord>) -> Self {
        Self { cameras }
    }

    /// The mock residence layout the dashboard ships with.
    pub fn seeded(now_ms: u64) -> Self {
        let locations: &[(&str, &str, CameraStatus)] = &[
            ("cam1", "Living Room", CameraStatus::Active),
            ("cam2", "Kitchen", CameraStatus::Active),
            ("cam3", "Bedroom", CameraStatus::Active),
            ("cam4", "Bathroom", CameraStatus::Active),
            ("cam5", "Hallway", CameraStatus::Offline),
            ("cam6", "Garden", CameraStatus::Active),
            ("cam7", "Dining Room", CameraStatus::Active),
            ("cam8", "Study Room", CameraStatus::Active),
            ("cam9", "Laundry Room", CameraStatus::Active),
            ("cam10", "Garage", CameraStatus::Offline),
            ("cam11", "Front Door", CameraStatus::Active),
            ("cam12", "Back Door", CameraStatus::Error),
            ("cam13", "Basement", CameraStatus::Active),
            ("cam14", "Attic", CameraStatus::Active),
            ("cam15", "Storage Room", CameraStatus::Offline),
            ("cam16", "Utility Room", CameraStatus::Active),
        ];
        Self::new(
            locations
                .iter()
                .map(|&(id, location, status)| CameraRecord::new(id, location, status, now_ms))
                .collect(),
        )
    }

    pub fn get(&self, id: &str) -> Option<&CameraRecord> {
        self.cameras.iter().find(|c| c.id == id)
    }

    pub fn list(&self) -> &[CameraRecord] {
        &self.cameras
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_directory_has_sixteen_cameras() {
        let dir = CameraDirectory::seeded(0);
        assert_eq!(dir.len(), 16);
        assert_eq!(dir.get("cam2").unwrap().location, "Kitchen");
        assert_eq!(dir.get("cam12").unwrap().status, CameraStatus::Error);
        assert!(dir.get("cam99").is_none());
    }
}
