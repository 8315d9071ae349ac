//! Multisets of classified surfaces.

use serde::{Deserialize, Serialize};

use strata_geometry::{ExPolygon, ExPolygons, Polygons};

use crate::surface::{Surface, SurfaceType};

/// A multiset of [`Surface`]s with filter and grouping helpers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceCollection {
    /// The surfaces.
    pub surfaces: Vec<Surface>,
}

impl SurfaceCollection {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no surface is present.
    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Number of surfaces.
    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    /// Remove every surface.
    pub fn clear(&mut self) {
        self.surfaces.clear();
    }

    /// Append shapes, all typed `surface_type`.
    pub fn append(&mut self, expolygons: ExPolygons, surface_type: SurfaceType) {
        self.surfaces
            .extend(expolygons.into_iter().map(|ex| Surface::new(surface_type, ex)));
    }

    /// Append surfaces from another collection.
    pub fn append_surfaces(&mut self, surfaces: Vec<Surface>) {
        self.surfaces.extend(surfaces);
    }

    /// Replace the content with shapes of one type.
    pub fn set(&mut self, expolygons: ExPolygons, surface_type: SurfaceType) {
        self.clear();
        self.append(expolygons, surface_type);
    }

    /// Surfaces matching a predicate.
    pub fn filter_by<'a>(
        &'a self,
        predicate: impl Fn(&SurfaceType) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Surface> {
        self.surfaces
            .iter()
            .filter(move |s| predicate(&s.surface_type))
    }

    /// Rings of surfaces whose type equals `surface_type`.
    pub fn polygons_by_type(&self, surface_type: SurfaceType) -> Polygons {
        self.filter_by(move |t| *t == surface_type)
            .flat_map(Surface::to_polygons)
            .collect()
    }

    /// Rings of surfaces matching a predicate.
    pub fn polygons_where(&self, predicate: impl Fn(&SurfaceType) -> bool) -> Polygons {
        self.filter_by(predicate)
            .flat_map(Surface::to_polygons)
            .collect()
    }

    /// All rings.
    pub fn to_polygons(&self) -> Polygons {
        self.surfaces.iter().flat_map(Surface::to_polygons).collect()
    }

    /// All shapes.
    pub fn to_expolygons(&self) -> ExPolygons {
        self.surfaces.iter().map(|s| s.expolygon.clone()).collect()
    }

    /// Drop surfaces matching a predicate.
    pub fn remove_where(&mut self, predicate: impl Fn(&SurfaceType) -> bool) {
        self.surfaces.retain(|s| !predicate(&s.surface_type));
    }

    /// Keep only surfaces matching a predicate.
    pub fn keep_where(&mut self, predicate: impl Fn(&SurfaceType) -> bool) {
        self.surfaces.retain(|s| predicate(&s.surface_type));
    }

    /// Partition into groups of mergeable surfaces (same type, bridge
    /// angle, thickness and extra perimeters).
    pub fn group(&self) -> Vec<Vec<&Surface>> {
        let mut groups: Vec<Vec<&Surface>> = Vec::new();
        for surface in &self.surfaces {
            match groups
                .iter_mut()
                .find(|g| g[0].can_merge_with(surface))
            {
                Some(group) => group.push(surface),
                None => groups.push(vec![surface]),
            }
        }
        groups
    }

    /// Simplify every shape, dropping degenerate results.
    pub fn simplify(&mut self, tolerance: f64) {
        let mut simplified = Vec::with_capacity(self.surfaces.len());
        for surface in self.surfaces.drain(..) {
            for ex in surface.expolygon.simplify(tolerance) {
                simplified.push(surface.clone_with_shape(ex));
            }
        }
        self.surfaces = simplified;
    }

    /// True when any internal surface contains the point set's first point.
    pub fn any_internal_contains(&self, expolygon: &ExPolygon) -> bool {
        expolygon.contour.first_point().is_some_and(|p| {
            self.filter_by(|t| t.is_internal())
                .any(|s| s.expolygon.contains_point(p))
        })
    }
}

impl From<Vec<Surface>> for SurfaceCollection {
    fn from(surfaces: Vec<Surface>) -> Self {
        Self { surfaces }
    }
}

impl FromIterator<Surface> for SurfaceCollection {
    fn from_iter<T: IntoIterator<Item = Surface>>(iter: T) -> Self {
        Self {
            surfaces: iter.into_iter().collect(),
        }
    }
}

/// Shapes of one expolygon set, all typed alike.
pub fn surfaces_from(expolygons: ExPolygons, surface_type: SurfaceType) -> Vec<Surface> {
    expolygons
        .into_iter()
        .map(|ex: ExPolygon| Surface::new(surface_type, ex))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_geometry::{Point, Polygon};

    fn square(side: i64) -> ExPolygon {
        ExPolygon::from_contour(Polygon::new(vec![
            Point::new(0, 0),
            Point::new(side, 0),
            Point::new(side, side),
            Point::new(0, side),
        ]))
    }

    #[test]
    fn test_filter_and_remove() {
        let mut collection = SurfaceCollection::new();
        collection.append(vec![square(10)], SurfaceType::TOP);
        collection.append(vec![square(20)], SurfaceType::INTERNAL);
        assert_eq!(collection.filter_by(|t| t.is_top()).count(), 1);
        collection.remove_where(|t| t.is_internal());
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_group_by_mergeability() {
        let mut collection = SurfaceCollection::new();
        collection.append(vec![square(10), square(20)], SurfaceType::TOP);
        collection.append(vec![square(30)], SurfaceType::INTERNAL);
        let groups = collection.group();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.iter().map(|g| g.len()).sum::<usize>(), 3);
    }

    #[test]
    fn test_group_splits_on_extra_perimeters() {
        let mut collection = SurfaceCollection::new();
        collection.append(vec![square(10), square(20)], SurfaceType::INTERNAL);
        collection.surfaces[1].extra_perimeters = 1;
        assert_eq!(collection.group().len(), 2);
    }
}
