//! The replicated game object.

use bitstream::{BinaryStream, NetSerialize, StreamResult};
use replica::transport::PeerId;
use replica::ObjectId;

use crate::rng::Rng;

pub const GREY: [f32; 3] = [0.5, 0.5, 0.5];
pub const GREEN: [f32; 3] = [0.0, 1.0, 0.0];

/// Half-extent of the square play area.
pub const ARENA: f32 = 10.0;

/// A coloured circle. Only the seven floats of position, radius and colour
/// are replicated.
#[derive(Debug, Clone, PartialEq)]
pub struct GameObject {
    pub pos: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
    pub alive: bool,
    /// Owning player, `None` for level objects.
    pub player: Option<PeerId>,
    pub net_id: ObjectId,
}

impl GameObject {
    /// Random position in the arena plane with a random radius.
    pub fn spawn(net_id: ObjectId, color: [f32; 3], rng: &mut Rng) -> Self {
        Self {
            pos: [
                rng.range_f32(-ARENA, ARENA),
                rng.range_f32(-ARENA, ARENA),
                0.0,
            ],
            radius: rng.range_f32(0.5, 2.0),
            color,
            alive: true,
            player: None,
            net_id,
        }
    }

    /// Blank stand-in for an object announced by the server.
    #[must_use]
    pub const fn remote(net_id: ObjectId) -> Self {
        Self {
            pos: [0.0; 3],
            radius: 0.0,
            color: [0.0; 3],
            alive: true,
            player: None,
            net_id,
        }
    }

    /// Random walk clamped to the arena.
    pub fn wander(&mut self, rng: &mut Rng, step: f32) {
        for axis in 0..2 {
            let moved = self.pos[axis] + rng.range_f32(-step, step);
            self.pos[axis] = moved.clamp(-ARENA, ARENA);
        }
    }
}

impl NetSerialize for GameObject {
    fn serialize(&mut self, stream: &mut BinaryStream<'_>) -> StreamResult<()> {
        self.pos.serialize(stream)?;
        stream.serialize_f32(&mut self.radius)?;
        self.color.serialize(stream)
    }
}
