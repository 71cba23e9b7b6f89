//! Évènements émis à chaque mutation de la playlist

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Nature d'une modification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaylistEventKind {
    /// Contenu ou ordre modifié (ajout, retrait, mélange, déplacement)
    Updated,
    /// La piste courante a changé
    CurrentChanged { track_id: Option<String> },
    /// Playlist vidée
    Cleared,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistEvent {
    #[serde(flatten)]
    pub kind: PlaylistEventKind,
    pub timestamp: DateTime<Utc>,
}

impl PlaylistEvent {
    pub fn new(kind: PlaylistEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Nom de l'évènement SSE
    pub fn name(&self) -> &'static str {
        match self.kind {
            PlaylistEventKind::Updated => "updated",
            PlaylistEventKind::CurrentChanged { .. } => "current_changed",
            PlaylistEventKind::Cleared => "cleared",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = PlaylistEvent::new(PlaylistEventKind::CurrentChanged {
            track_id: Some("abc".into()),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "current_changed");
        assert_eq!(value["track_id"], "abc");
        assert!(value["timestamp"].is_string());
        assert_eq!(event.name(), "current_changed");
    }
}
