//! Visible state of the live-stream panel.

use crate::types::RoomId;

pub const ENTER_ROOM_MESSAGE: &str = "Please enter a roomId";
pub const LOAD_FAILED_MESSAGE: &str = "Could not load stream (check roomId/permissions).";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    NotAttempted,
    Loading,
    Loaded,
    Failed(String),
}

/// One stream panel. Every show bumps the refresh key so the resource is
/// requested again even for the same room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamView {
    room: Option<RoomId>,
    status: StreamStatus,
    refresh_key: u64,
}

impl Default for StreamView {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamView {
    pub fn new() -> Self {
        Self {
            room: None,
            status: StreamStatus::NotAttempted,
            refresh_key: 0,
        }
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn status(&self) -> &StreamStatus {
        &self.status
    }

    pub fn refresh_key(&self) -> u64 {
        self.refresh_key
    }

    /// Start showing `input`. Blank input fails without starting a load.
    pub fn show(&mut self, input: &str) -> Option<RoomId> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            self.room = None;
            self.status = StreamStatus::Failed(ENTER_ROOM_MESSAGE.to_string());
            return None;
        }
        let room = RoomId::new(trimmed);
        self.room = Some(room.clone());
        self.status = StreamStatus::Loading;
        self.refresh_key += 1;
        Some(room)
    }

    pub fn loaded(&mut self) {
        self.status = StreamStatus::Loaded;
    }

    pub fn failed(&mut self) {
        self.status = StreamStatus::Failed(LOAD_FAILED_MESSAGE.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_attempted() {
        let view = StreamView::new();
        assert_eq!(view.status(), &StreamStatus::NotAttempted);
        assert!(view.room().is_none());
    }

    #[test]
    fn blank_room_fails_without_loading() {
        let mut view = StreamView::new();
        assert!(view.show("   ").is_none());
        assert_eq!(
            view.status(),
            &StreamStatus::Failed(ENTER_ROOM_MESSAGE.to_string())
        );
        assert_eq!(view.refresh_key(), 0);
    }

    #[test]
    fn show_load_fail_cycle() {
        let mut view = StreamView::new();
        assert_eq!(view.show(" room42 ").unwrap().as_str(), "room42");
        assert_eq!(view.status(), &StreamStatus::Loading);
        view.failed();
        assert_eq!(
            view.status(),
            &StreamStatus::Failed(LOAD_FAILED_MESSAGE.to_string())
        );

        view.show("room42");
        assert_eq!(view.refresh_key(), 2);
        view.loaded();
        assert_eq!(view.status(), &StreamStatus::Loaded);
    }
}
