//! Delivery of asynchronous provider results back to the frame loop.
//!
//! Each request carries a token identifying what asked for it. Providers
//! answer through a [`Responder`], which pushes the result onto a channel
//! the surface drains at the start of the next frame. Tokens that no longer
//! match a live tile or imagery are discarded there.

use std::marker::PhantomData;

use crossbeam_channel::{Receiver, Sender, unbounded};
use image::RgbaImage;

use crate::error::LoadFailure;
use crate::imagery::{ImageryId, LayerId};
use crate::provider::TerrainData;
use crate::tile::TileId;

/// Identifies the tile and terrain provider generation a terrain request
/// was issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TerrainToken {
    pub tile: TileId,
    pub provider_epoch: u64,
}

/// Identifies the layer and cached imagery an imagery request was issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ImageryToken {
    pub layer: LayerId,
    pub imagery: ImageryId,
}

#[derive(Clone, Copy, Debug)]
enum Target {
    Terrain(TerrainToken),
    Imagery(ImageryToken),
}

#[derive(Debug)]
pub(crate) enum Completion {
    Terrain(TerrainToken, Result<TerrainData, LoadFailure>),
    Imagery(ImageryToken, Result<RgbaImage, LoadFailure>),
}

/// One-shot handle a provider uses to answer a request.
///
/// Dropping a responder without resolving it reports the request as
/// cancelled, so the surface will ask again later.
pub struct Responder<T> {
    sender: Option<Sender<Completion>>,
    target: Target,
    _payload: PhantomData<fn(T)>,
}

impl<T> Responder<T> {
    fn send(&mut self, completion: Completion) {
        if let Some(sender) = self.sender.take()
            && sender.send(completion).is_err()
        {
            tracing::trace!("completion dropped, surface no longer listening");
        }
    }

    /// Consume the responder without reporting anything. Used when the
    /// provider hands the responder back because it is saturated.
    pub(crate) fn disarm(mut self) {
        self.sender = None;
    }
}

impl Responder<TerrainData> {
    pub fn resolve(mut self, result: Result<TerrainData, LoadFailure>) {
        if let Target::Terrain(token) = self.target {
            self.send(Completion::Terrain(token, result));
        }
    }
}

impl Responder<RgbaImage> {
    pub fn resolve(mut self, result: Result<RgbaImage, LoadFailure>) {
        if let Target::Imagery(token) = self.target {
            self.send(Completion::Imagery(token, result));
        }
    }
}

impl<T> Drop for Responder<T> {
    fn drop(&mut self) {
        if self.sender.is_none() {
            return;
        }
        let completion = match self.target {
            Target::Terrain(token) => Completion::Terrain(token, Err(LoadFailure::cancelled())),
            Target::Imagery(token) => Completion::Imagery(token, Err(LoadFailure::cancelled())),
        };
        self.send(completion);
    }
}

impl<T> std::fmt::Debug for Responder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("target", &self.target)
            .field("armed", &self.sender.is_some())
            .finish()
    }
}

/// The surface's end of the completion channel.
pub(crate) struct CompletionQueue {
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
}

impl CompletionQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn terrain_responder(&self, token: TerrainToken) -> Responder<TerrainData> {
        Responder {
            sender: Some(self.sender.clone()),
            target: Target::Terrain(token),
            _payload: PhantomData,
        }
    }

    pub fn imagery_responder(&self, token: ImageryToken) -> Responder<RgbaImage> {
        Responder {
            sender: Some(self.sender.clone()),
            target: Target::Imagery(token),
            _payload: PhantomData,
        }
    }

    /// Everything delivered since the last drain, in arrival order.
    pub fn drain(&self) -> Vec<Completion> {
        self.receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadFailureKind;

    fn terrain_token() -> TerrainToken {
        TerrainToken {
            tile: TileId::new(3, 1),
            provider_epoch: 7,
        }
    }

    #[test]
    fn test_resolved_terrain_arrives_on_drain() {
        let queue = CompletionQueue::new();
        let responder = queue.terrain_responder(terrain_token());
        responder.resolve(Ok(TerrainData::flat(2, 2)));

        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        match &drained[0] {
            Completion::Terrain(token, Ok(data)) => {
                assert_eq!(*token, terrain_token());
                assert_eq!(data.width, 2);
            }
            other => panic!("unexpected completion {other:?}"),
        }
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_dropped_responder_reports_cancellation() {
        let queue = CompletionQueue::new();
        drop(queue.imagery_responder(ImageryToken {
            layer: LayerId(1),
            imagery: ImageryId::new(0, 0),
        }));

        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        match &drained[0] {
            Completion::Imagery(_, Err(failure)) => assert_eq!(failure.kind, LoadFailureKind::Cancelled),
            other => panic!("unexpected completion {other:?}"),
        }
    }

    #[test]
    fn test_disarmed_responder_is_silent() {
        let queue = CompletionQueue::new();
        queue.terrain_responder(terrain_token()).disarm();
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_resolution_from_another_thread() {
        let queue = CompletionQueue::new();
        let responder = queue.terrain_responder(terrain_token());
        std::thread::spawn(move || responder.resolve(Ok(TerrainData::flat(1, 1))))
            .join()
            .expect("worker thread panicked");
        assert_eq!(queue.drain().len(), 1);
    }
}
