//! Rooms as listed by the backend, and the stream page's search box.

use serde::{Deserialize, Serialize};

use crate::types::RoomId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    #[serde(rename = "cameraId", default)]
    pub camera_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "_id")]
    pub id: RoomId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cameras: Vec<Camera>,
}

impl Room {
    /// Camera id of the first camera, if any.
    pub fn first_camera(&self) -> Option<&str> {
        self.cameras.first().and_then(|c| c.camera_id.as_deref())
    }

    fn matches(&self, needle: &str) -> bool {
        let cameras = self
            .cameras
            .iter()
            .filter_map(|c| c.camera_id.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        self.name.to_lowercase().contains(needle)
            || self.id.as_str().to_lowercase().contains(needle)
            || self
                .description
                .as_deref()
                .unwrap_or_default()
                .to_lowercase()
                .contains(needle)
            || cameras.contains(needle)
    }
}

/// Case-insensitive search over name, id, description and camera ids.
/// An empty query keeps every room.
pub fn filter_rooms<'a>(rooms: &'a [Room], query: &str) -> Vec<&'a Room> {
    if query.is_empty() {
        return rooms.iter().collect();
    }
    let needle = query.to_lowercase();
    rooms.iter().filter(|room| room.matches(&needle)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rooms() -> Vec<Room> {
        serde_json::from_value(serde_json::json!([
            {
                "_id": "65f0a1",
                "name": "Physics Lab",
                "description": "Second floor",
                "cameras": [{"cameraId": "CAM-17"}]
            },
            {
                "_id": "65f0b2",
                "name": "Lecture Hall",
                "cameras": []
            }
        ]))
        .unwrap()
    }

    #[test]
    fn empty_query_keeps_all() {
        assert_eq!(filter_rooms(&rooms(), "").len(), 2);
    }

    #[test]
    fn matches_each_field() {
        let rooms = rooms();
        assert_eq!(filter_rooms(&rooms, "physics")[0].id.as_str(), "65f0a1");
        assert_eq!(filter_rooms(&rooms, "65F0B")[0].name, "Lecture Hall");
        assert_eq!(filter_rooms(&rooms, "second")[0].id.as_str(), "65f0a1");
        assert_eq!(filter_rooms(&rooms, "cam-17").len(), 1);
        assert!(filter_rooms(&rooms, "basement").is_empty());
    }

    #[test]
    fn first_camera() {
        let rooms = rooms();
        assert_eq!(rooms[0].first_camera(), Some("CAM-17"));
        assert_eq!(rooms[1].first_camera(), None);
    }
}
