use crate::types::{ClientId, ReqId};

/// A single paint action.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    pub x: i32,
    pub y: i32,
    pub radius: f32,
    /// 6 hex chars, without the leading `#`.
    pub color: String,
}

/// An opaque encoded raster plus its format header. The core never looks
/// inside the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotImage {
    pub header: String,
    pub payload: String,
}

/// Typed form of the pipe-delimited text frames exchanged through the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Paint(Delta),
    SnapshotRequest {
        req_id: ReqId,
        requester_id: ClientId,
        width: u32,
        height: u32,
    },
    SnapshotResponse {
        req_id: ReqId,
        responder_id: ClientId,
        image: SnapshotImage,
    },
    /// Presence announcement. Accepted on the wire but not acted upon.
    Presence { client_id: ClientId },
}

impl Message {
    /// Decodes a text frame. Returns `None` for unknown frame types and for
    /// frames with the wrong field count; callers drop those silently.
    ///
    /// A message whose second byte is not `|` is a legacy unframed delta and
    /// decodes exactly like a `P` body.
    pub fn decode(raw: &str) -> Option<Message> {
        let bytes = raw.as_bytes();
        if bytes.len() >= 2 && bytes[1] == b'|' {
            let rest = &raw[2..];
            match bytes[0] {
                b'P' => decode_delta(rest).map(Message::Paint),
                b'R' => decode_request(rest),
                b'S' => decode_response(rest),
                b'H' => decode_presence(rest),
                _ => None,
            }
        } else {
            decode_delta(raw).map(Message::Paint)
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Message::Paint(delta) => format!(
                "P|{}|{}|{}|{}",
                delta.x, delta.y, delta.radius, delta.color
            ),
            Message::SnapshotRequest {
                req_id,
                requester_id,
                width,
                height,
            } => format!("R|{}|{}|{}|{}", req_id, requester_id, width, height),
            Message::SnapshotResponse {
                req_id,
                responder_id,
                image,
            } => format!(
                "S|{}|{}|{}|{}",
                req_id, responder_id, image.header, image.payload
            ),
            Message::Presence { client_id } => format!("H|{}", client_id),
        }
    }
}

fn decode_delta(body: &str) -> Option<Delta> {
    let fields: Vec<&str> = body.split('|').collect();
    if fields.len() != 4 {
        return None;
    }
    let x = fields[0].parse::<i32>().ok()?;
    let y = fields[1].parse::<i32>().ok()?;
    let radius = fields[2].parse::<f32>().ok()?;
    Some(Delta {
        x,
        y,
        radius,
        color: fields[3].to_string(),
    })
}

fn decode_request(body: &str) -> Option<Message> {
    let fields: Vec<&str> = body.split('|').collect();
    if fields.len() != 4 || fields[0].is_empty() || fields[1].is_empty() {
        return None;
    }
    Some(Message::SnapshotRequest {
        req_id: fields[0].to_string(),
        requester_id: fields[1].to_string(),
        width: fields[2].parse::<u32>().ok()?,
        height: fields[3].parse::<u32>().ok()?,
    })
}

fn decode_response(body: &str) -> Option<Message> {
    // Bounded split: the final field is a base64 payload and must survive
    // as one piece even if it ever contains the delimiter.
    let fields: Vec<&str> = body.splitn(4, '|').collect();
    if fields.len() != 4 || fields[0].is_empty() {
        return None;
    }
    Some(Message::SnapshotResponse {
        req_id: fields[0].to_string(),
        responder_id: fields[1].to_string(),
        image: SnapshotImage {
            header: fields[2].to_string(),
            payload: fields[3].to_string(),
        },
    })
}

fn decode_presence(body: &str) -> Option<Message> {
    if body.is_empty() || body.contains('|') {
        return None;
    }
    Some(Message::Presence {
        client_id: body.to_string(),
    })
}
