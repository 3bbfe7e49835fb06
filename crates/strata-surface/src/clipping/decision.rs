//! Combines plane and polygon clipping into one decision per tile.

use strata_geo::{BoundingSphere, Intersect, Rectangle};

use super::{PlaneSnapshot, PolygonSnapshot};

/// How clipping affects a tile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClipDecision {
    /// Nothing clipped.
    #[default]
    Unclipped,
    /// Drawn, with per-fragment clipping.
    PartiallyClipped,
    /// Entirely removed; not loaded or drawn.
    FullyCulled,
}

impl ClipDecision {
    /// The stronger of two decisions.
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Self::FullyCulled, _) | (_, Self::FullyCulled) => Self::FullyCulled,
            (Self::PartiallyClipped, _) | (_, Self::PartiallyClipped) => Self::PartiallyClipped,
            _ => Self::Unclipped,
        }
    }
}

/// Clipping state frozen for one frame.
#[derive(Clone, Debug, Default)]
pub struct ClipDecisionEngine {
    planes: Option<PlaneSnapshot>,
    polygons: Option<PolygonSnapshot>,
}

impl ClipDecisionEngine {
    pub fn new(planes: Option<PlaneSnapshot>, polygons: Option<PolygonSnapshot>) -> Self {
        Self {
            planes: planes.filter(PlaneSnapshot::is_active),
            polygons: polygons.filter(PolygonSnapshot::is_active),
        }
    }

    /// Whether any clipping applies this frame.
    pub fn is_active(&self) -> bool {
        self.planes.is_some() || self.polygons.is_some()
    }

    pub fn planes(&self) -> Option<&PlaneSnapshot> {
        self.planes.as_ref()
    }

    pub fn polygons(&self) -> Option<&PolygonSnapshot> {
        self.polygons.as_ref()
    }

    pub fn plane_decision(&self, sphere: &BoundingSphere) -> ClipDecision {
        match self.planes.as_ref().map(|planes| planes.intersect(sphere)) {
            Some(Intersect::Outside) => ClipDecision::FullyCulled,
            Some(Intersect::Intersecting) => ClipDecision::PartiallyClipped,
            Some(Intersect::Inside) | None => ClipDecision::Unclipped,
        }
    }

    pub fn polygon_decision(&self, rectangle: &Rectangle) -> ClipDecision {
        let Some(polygons) = self.polygons.as_ref() else {
            return ClipDecision::Unclipped;
        };
        match (polygons.intersect(rectangle), polygons.inverse) {
            (Intersect::Intersecting, _) => ClipDecision::PartiallyClipped,
            (Intersect::Inside, false) | (Intersect::Outside, true) => ClipDecision::FullyCulled,
            (Intersect::Outside, false) | (Intersect::Inside, true) => ClipDecision::Unclipped,
        }
    }

    /// Decision for a tile with the given bounds.
    pub fn decide(&self, sphere: &BoundingSphere, rectangle: &Rectangle) -> ClipDecision {
        self.plane_decision(sphere).combine(self.polygon_decision(rectangle))
    }
}
