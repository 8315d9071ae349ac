//! Extrusion entities: the pipeline's output vocabulary.
//!
//! Entities form a closed sum of paths, loops and collections; a collection
//! marked `no_sort` must be emitted in its stored order, anything else may be
//! reordered by the G-code backend.

use serde::{Deserialize, Serialize};

use strata_geometry::{chained_path_from, Point, Polygon, Polyline};

/// What an extrusion is for; drives speed, fan and ordering downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtrusionRole {
    /// Inner perimeter loop.
    Perimeter,
    /// Outermost perimeter loop.
    ExternalPerimeter,
    /// Perimeter hanging over air.
    OverhangPerimeter,
    /// Sparse internal infill.
    InternalInfill,
    /// Solid infill.
    SolidInfill,
    /// Topmost solid infill.
    TopSolidInfill,
    /// Infill bridging over air or sparse infill.
    BridgeInfill,
    /// Single-pass wall thinner than two extrusion widths.
    ThinWall,
    /// Fill of gaps between perimeter loops.
    GapFill,
    /// Skirt and brim loops.
    Skirt,
    /// Support material base.
    SupportMaterial,
    /// Support material interface.
    SupportMaterialInterface,
    /// Wipe tower scaffold (multi-material collaborator).
    WipeTower,
    /// A collection mixing several roles.
    Mixed,
}

/// An open extruded path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtrusionPath {
    /// Centerline.
    pub polyline: Polyline,
    /// Role of the extrusion.
    pub role: ExtrusionRole,
    /// Volume per head-move unit, mm³/mm.
    pub mm3_per_mm: f64,
    /// Width in millimeters.
    pub width: f64,
    /// Height in millimeters.
    pub height: f64,
}

impl ExtrusionPath {
    /// Create a path.
    pub fn new(
        polyline: Polyline,
        role: ExtrusionRole,
        mm3_per_mm: f64,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            polyline,
            role,
            mm3_per_mm,
            width,
            height,
        }
    }

    /// Centerline length in scaled units.
    pub fn length(&self) -> f64 {
        self.polyline.length()
    }
}

/// A closed extruded loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtrusionLoop {
    /// The loop ring; the first vertex is the seam.
    pub polygon: Polygon,
    /// Role of the extrusion.
    pub role: ExtrusionRole,
    /// Volume per head-move unit, mm³/mm.
    pub mm3_per_mm: f64,
    /// Width in millimeters.
    pub width: f64,
    /// Height in millimeters.
    pub height: f64,
}

impl ExtrusionLoop {
    /// Create a loop.
    pub fn new(
        polygon: Polygon,
        role: ExtrusionRole,
        mm3_per_mm: f64,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            polygon,
            role,
            mm3_per_mm,
            width,
            height,
        }
    }

    /// Re-root the ring so extrusion starts at vertex `index`.
    pub fn set_seam_index(&mut self, index: usize) {
        if index > 0 && index < self.polygon.len() {
            self.polygon.points.rotate_left(index);
        }
    }

    /// Loop length in scaled units.
    pub fn length(&self) -> f64 {
        self.polygon.length()
    }
}

/// The closed sum of extrusion shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExtrusionEntity {
    /// An open path.
    Path(ExtrusionPath),
    /// A closed loop.
    Loop(ExtrusionLoop),
    /// A nested collection.
    Collection(ExtrusionEntityCollection),
}

impl ExtrusionEntity {
    /// First point the head visits.
    pub fn first_point(&self) -> Option<Point> {
        match self {
            ExtrusionEntity::Path(p) => p.polyline.first_point(),
            ExtrusionEntity::Loop(l) => l.polygon.first_point(),
            ExtrusionEntity::Collection(c) => c.first_point(),
        }
    }

    /// Last point the head visits.
    pub fn last_point(&self) -> Option<Point> {
        match self {
            ExtrusionEntity::Path(p) => p.polyline.last_point(),
            // a loop ends where it starts
            ExtrusionEntity::Loop(l) => l.polygon.first_point(),
            ExtrusionEntity::Collection(c) => c.entities.last().and_then(|e| e.last_point()),
        }
    }

    /// Total centerline length in scaled units.
    pub fn length(&self) -> f64 {
        match self {
            ExtrusionEntity::Path(p) => p.length(),
            ExtrusionEntity::Loop(l) => l.length(),
            ExtrusionEntity::Collection(c) => c.length(),
        }
    }

    /// The centerlines of every contained path and loop.
    pub fn polylines(&self) -> Vec<Polyline> {
        match self {
            ExtrusionEntity::Path(p) => vec![p.polyline.clone()],
            ExtrusionEntity::Loop(l) => vec![l.polygon.split_at_first_point()],
            ExtrusionEntity::Collection(c) => {
                c.entities.iter().flat_map(|e| e.polylines()).collect()
            }
        }
    }
}

/// An ordered set of extrusion entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtrusionEntityCollection {
    /// The entities, in emission order when `no_sort` is set.
    pub entities: Vec<ExtrusionEntity>,
    /// Must be emitted in the stored order.
    pub no_sort: bool,
}

impl ExtrusionEntityCollection {
    /// An empty, sortable collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty collection that must keep its order.
    pub fn no_sort() -> Self {
        Self {
            entities: Vec::new(),
            no_sort: true,
        }
    }

    /// True when no entity is present.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Remove every entity.
    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Append one entity.
    pub fn append(&mut self, entity: ExtrusionEntity) {
        self.entities.push(entity);
    }

    /// Append paths built from polylines sharing one flow.
    pub fn append_paths(
        &mut self,
        polylines: Vec<Polyline>,
        role: ExtrusionRole,
        mm3_per_mm: f64,
        width: f64,
        height: f64,
    ) {
        for polyline in polylines {
            if polyline.is_valid() {
                self.entities.push(ExtrusionEntity::Path(ExtrusionPath::new(
                    polyline, role, mm3_per_mm, width, height,
                )));
            }
        }
    }

    /// First point of the first entity.
    pub fn first_point(&self) -> Option<Point> {
        self.entities.first().and_then(|e| e.first_point())
    }

    /// Total centerline length in scaled units.
    pub fn length(&self) -> f64 {
        self.entities.iter().map(|e| e.length()).sum()
    }

    /// Reorder sortable entities by nearest-neighbor from `start`.
    ///
    /// `no_sort` collections keep their order; nested collections are
    /// reordered recursively.
    pub fn chained_order(&mut self, start: Point) {
        if !self.no_sort {
            let starts: Vec<Point> = self
                .entities
                .iter()
                .map(|e| e.first_point().unwrap_or(start))
                .collect();
            let order = chained_path_from(&starts, start);
            let mut reordered = Vec::with_capacity(self.entities.len());
            let mut taken: Vec<Option<ExtrusionEntity>> =
                self.entities.drain(..).map(Some).collect();
            for idx in order {
                if let Some(entity) = taken[idx].take() {
                    reordered.push(entity);
                }
            }
            self.entities = reordered;
        }
        let mut cursor = start;
        for entity in &mut self.entities {
            if let ExtrusionEntity::Collection(inner) = entity {
                inner.chained_order(cursor);
            }
            cursor = entity.last_point().unwrap_or(cursor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_at(x: i64) -> ExtrusionEntity {
        ExtrusionEntity::Path(ExtrusionPath::new(
            Polyline::new(vec![Point::new(x, 0), Point::new(x + 10, 0)]),
            ExtrusionRole::InternalInfill,
            0.05,
            0.45,
            0.2,
        ))
    }

    #[test]
    fn test_chained_order() {
        let mut collection = ExtrusionEntityCollection::new();
        collection.append(path_at(100));
        collection.append(path_at(0));
        collection.append(path_at(50));
        collection.chained_order(Point::new(0, 0));
        let xs: Vec<i64> = collection
            .entities
            .iter()
            .map(|e| e.first_point().unwrap().x)
            .collect();
        assert_eq!(xs, vec![0, 50, 100]);
    }

    #[test]
    fn test_no_sort_is_kept() {
        let mut collection = ExtrusionEntityCollection::no_sort();
        collection.append(path_at(100));
        collection.append(path_at(0));
        collection.chained_order(Point::new(0, 0));
        let xs: Vec<i64> = collection
            .entities
            .iter()
            .map(|e| e.first_point().unwrap().x)
            .collect();
        assert_eq!(xs, vec![100, 0]);
    }

    #[test]
    fn test_loop_seam_rotation() {
        let mut l = ExtrusionLoop::new(
            Polygon::new(vec![
                Point::new(0, 0),
                Point::new(10, 0),
                Point::new(10, 10),
                Point::new(0, 10),
            ]),
            ExtrusionRole::Perimeter,
            0.05,
            0.45,
            0.2,
        );
        l.set_seam_index(2);
        assert_eq!(l.polygon.first_point(), Some(Point::new(10, 10)));
        assert_eq!(l.polygon.len(), 4);
    }
}
