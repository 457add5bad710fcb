//! Wire records exchanged with the solver worker.
//!
//! Every request carries a host-assigned `id`; the worker echoes it on the
//! reply. `READY` is the only message that answers nothing.
//!
//! JSON shapes, one frame per line on the process transport:
//!
//! ```text
//! host → worker   {"id":7,"request":{"type":"MOVE","direction":1}}
//! worker → host   {"event":"reply","id":7,"response":{"type":"MOVE"}}
//! worker → host   {"event":"ready"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical operation name tagging a request and its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    Setup,
    Board,
    Move,
    Add,
    Solve,
    Tile,
    Reset,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Setup => "SETUP",
            Kind::Board => "BOARD",
            Kind::Move => "MOVE",
            Kind::Add => "ADD",
            Kind::Solve => "SOLVE",
            Kind::Tile => "TILE",
            Kind::Reset => "RESET",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// Initialize search tables and RNG; clears the mirrored board.
    Setup {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
    /// Replace the mirrored board with row-major face values (0 = empty).
    Board { tiles: Vec<u32> },
    /// Apply a human move (direction code 0..=3) to the mirror.
    Move { direction: u8 },
    /// A tile was placed at row-major `position` with face `value`.
    Add { position: usize, value: u32 },
    /// Best move for the mirror; the worker applies it to its mirror.
    Solve,
    /// Adversarial placement for the mirror; not applied.
    Tile,
    Reset {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
}

impl Request {
    pub fn kind(&self) -> Kind {
        match self {
            Request::Setup { .. } => Kind::Setup,
            Request::Board { .. } => Kind::Board,
            Request::Move { .. } => Kind::Move,
            Request::Add { .. } => Kind::Add,
            Request::Solve => Kind::Solve,
            Request::Tile => Kind::Tile,
            Request::Reset { .. } => Kind::Reset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    Setup,
    Board,
    Move,
    Add,
    /// `None` when no move changes the board.
    Solve { direction: Option<u8> },
    /// `0..n` places a 2 at that index, `n..2n` a 4 at `code - n`.
    /// `None` when the board is full.
    Tile { position_code: Option<u32> },
    Reset,
    /// The worker could not honor a request of `kind`.
    Failed { kind: Kind, message: String },
}

impl Response {
    pub fn kind(&self) -> Kind {
        match self {
            Response::Setup => Kind::Setup,
            Response::Board => Kind::Board,
            Response::Move => Kind::Move,
            Response::Add => Kind::Add,
            Response::Solve { .. } => Kind::Solve,
            Response::Tile { .. } => Kind::Tile,
            Response::Reset => Kind::Reset,
            Response::Failed { kind, .. } => *kind,
        }
    }

    /// The empty acknowledgement for `kind`; `None` for kinds that carry data.
    pub fn ack(kind: Kind) -> Option<Self> {
        match kind {
            Kind::Setup => Some(Response::Setup),
            Kind::Board => Some(Response::Board),
            Kind::Move => Some(Response::Move),
            Kind::Add => Some(Response::Add),
            Kind::Reset => Some(Response::Reset),
            Kind::Solve | Kind::Tile => None,
        }
    }
}

/// Host → worker frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    pub request: Request,
}

/// Worker → host frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Sent once, unsolicited, after the worker finished initializing.
    Ready,
    Reply { id: u64, response: Response },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_frames_are_tagged() {
        let frame = RequestFrame { id: 3, request: Request::Add { position: 5, value: 2 } };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"id": 3, "request": {"type": "ADD", "position": 5, "value": 2}})
        );
        let solve = RequestFrame { id: 4, request: Request::Solve };
        assert_eq!(serde_json::to_value(&solve).unwrap(), json!({"id": 4, "request": {"type": "SOLVE"}}));
        let setup: RequestFrame = serde_json::from_value(json!({"id": 1, "request": {"type": "SETUP"}})).unwrap();
        assert_eq!(setup.request, Request::Setup { seed: None });
    }

    #[test]
    fn worker_messages_round_trip() {
        let ready = serde_json::to_string(&WorkerMessage::Ready).unwrap();
        assert_eq!(ready, r#"{"event":"ready"}"#);
        let reply = WorkerMessage::Reply { id: 9, response: Response::Tile { position_code: Some(17) } };
        let text = serde_json::to_string(&reply).unwrap();
        assert_eq!(serde_json::from_str::<WorkerMessage>(&text).unwrap(), reply);
        let failed: WorkerMessage = serde_json::from_value(json!({
            "event": "reply",
            "id": 2,
            "response": {"type": "FAILED", "kind": "BOARD", "message": "bad size"}
        }))
        .unwrap();
        let WorkerMessage::Reply { response, .. } = failed else { panic!("expected reply") };
        assert_eq!(response.kind(), Kind::Board);
    }

    #[test]
    fn kinds_match_between_request_and_ack() {
        for req in [
            Request::Setup { seed: Some(1) },
            Request::Board { tiles: vec![0; 16] },
            Request::Move { direction: 0 },
            Request::Add { position: 0, value: 2 },
            Request::Reset { seed: None },
        ] {
            assert_eq!(Response::ack(req.kind()).map(|r| r.kind()), Some(req.kind()));
        }
        assert_eq!(Response::ack(Kind::Solve), None);
        assert_eq!(Kind::Tile.to_string(), "TILE");
    }
}
