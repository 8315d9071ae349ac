//! Layers and their per-region slices.

use strata_geometry::{chained_path, union_ex, ExPolygon, ExPolygons, Polygons, Polylines};

use crate::extrusion::ExtrusionEntityCollection;
use crate::print::RegionKey;
use crate::surface_collection::SurfaceCollection;

/// The part of a layer belonging to one print region.
///
/// Owns the island shape (`slices`), the surfaces infill will fill, and the
/// generated extrusions. The back-reference to the region is a slot-map key,
/// never an owning link.
#[derive(Debug, Clone)]
pub struct LayerRegion {
    /// The print region this data belongs to.
    pub region: RegionKey,
    /// Island shape of this region on this layer, classified by the surface
    /// detector.
    pub slices: SurfaceCollection,
    /// What infill will fill; always contained in `slices`.
    pub fill_surfaces: SurfaceCollection,
    /// Perimeter loops, ordered.
    pub perimeters: ExtrusionEntityCollection,
    /// Fill extrusions, ordered.
    pub fills: ExtrusionEntityCollection,
    /// Single-pass walls captured by the medial axis.
    pub thin_fills: ExtrusionEntityCollection,
    /// Subtractive post-processing passes; reserved for the milling
    /// extension.
    pub milling: ExtrusionEntityCollection,
    /// Bridge edges that found no anchor; diagnostics for warnings.
    pub unsupported_bridge_edges: Polylines,
}

impl LayerRegion {
    /// An empty region of a layer.
    pub fn new(region: RegionKey) -> Self {
        Self {
            region,
            slices: SurfaceCollection::new(),
            fill_surfaces: SurfaceCollection::new(),
            perimeters: ExtrusionEntityCollection::no_sort(),
            fills: ExtrusionEntityCollection::new(),
            thin_fills: ExtrusionEntityCollection::new(),
            milling: ExtrusionEntityCollection::new(),
            unsupported_bridge_edges: Polylines::new(),
        }
    }

    /// All slice rings of this region.
    pub fn slices_polygons(&self) -> Polygons {
        self.slices.to_polygons()
    }

    /// Drop all generated extrusions, keeping the slices.
    pub fn clear_extrusions(&mut self) {
        self.perimeters.clear();
        self.fills.clear();
        self.thin_fills.clear();
        self.unsupported_bridge_edges.clear();
    }
}

/// One horizontal slab of an object.
///
/// `print_z` is the top of the layer, `slice_z` the mid-height used to probe
/// the mesh. Upper/lower neighbors are adjacent entries of the owning
/// object's layer vector, never owning links.
#[derive(Debug, Clone)]
pub struct Layer {
    /// Layer id; raft layers shift object ids upward.
    pub id: usize,
    /// Top of the layer, print coordinates.
    pub print_z: f64,
    /// Mid-layer probe Z, object coordinates.
    pub slice_z: f64,
    /// Layer thickness.
    pub height: f64,
    /// Merged islands of all regions, ordered by a chained path.
    pub lslices: ExPolygons,
    /// Per-region slice data.
    pub regions: Vec<LayerRegion>,
}

impl Layer {
    /// A fresh layer with no regions.
    pub fn new(id: usize, height: f64, print_z: f64, slice_z: f64) -> Self {
        Self {
            id,
            print_z,
            slice_z,
            height,
            lslices: ExPolygons::new(),
            regions: Vec::new(),
        }
    }

    /// The data of one region on this layer.
    pub fn region(&self, key: RegionKey) -> Option<&LayerRegion> {
        self.regions.iter().find(|r| r.region == key)
    }

    /// Mutable access to one region's data.
    pub fn region_mut(&mut self, key: RegionKey) -> Option<&mut LayerRegion> {
        self.regions.iter_mut().find(|r| r.region == key)
    }

    /// Rings of every region's slices.
    pub fn all_slices_polygons(&self) -> Polygons {
        self.regions
            .iter()
            .flat_map(LayerRegion::slices_polygons)
            .collect()
    }

    /// Merge all regions' slices into the layer islands.
    ///
    /// Islands are ordered by a chained path over contour centroids; the
    /// centroid is used instead of the first point because it is stable
    /// across similar layers.
    pub fn make_slices(&mut self) {
        let merged: ExPolygons = if self.regions.len() == 1 {
            union_ex(&self.regions[0].slices_polygons())
        } else {
            union_ex(&self.all_slices_polygons())
        };

        let centroids: Vec<_> = merged.iter().map(|ex| ex.contour.centroid()).collect();
        let order = chained_path(&centroids);
        let mut slot: Vec<Option<ExPolygon>> = merged.into_iter().map(Some).collect();
        self.lslices = order
            .into_iter()
            .filter_map(|i| slot[i].take())
            .collect();
    }

    /// True when any region's internal slice contains the expolygon's first
    /// point.
    pub fn any_internal_region_slice_contains(&self, expolygon: &ExPolygon) -> bool {
        self.regions
            .iter()
            .any(|r| r.slices.any_internal_contains(expolygon))
    }
}

/// A support-material slab; owns islands and toolpaths but no regions.
#[derive(Debug, Clone)]
pub struct SupportLayer {
    /// Support layer id.
    pub id: usize,
    /// Top of the layer, print coordinates.
    pub print_z: f64,
    /// Layer thickness.
    pub height: f64,
    /// Merged support islands.
    pub support_islands: ExPolygons,
    /// Base and contact extrusions.
    pub support_fills: ExtrusionEntityCollection,
    /// Interface extrusions.
    pub support_interface_fills: ExtrusionEntityCollection,
}

impl SupportLayer {
    /// A fresh support layer.
    pub fn new(id: usize, print_z: f64, height: f64) -> Self {
        Self {
            id,
            print_z,
            height,
            support_islands: ExPolygons::new(),
            support_fills: ExtrusionEntityCollection::new(),
            support_interface_fills: ExtrusionEntityCollection::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceType;
    use strata_geometry::{Point, Polygon};

    fn square_at(x: i64, side: i64) -> ExPolygon {
        ExPolygon::from_contour(Polygon::new(vec![
            Point::new(x, 0),
            Point::new(x + side, 0),
            Point::new(x + side, side),
            Point::new(x, side),
        ]))
    }

    #[test]
    fn test_make_slices_merges_and_orders() {
        let mut layer = Layer::new(0, 0.2, 0.2, 0.1);
        let key = RegionKey::default();
        let mut region = LayerRegion::new(key);
        region
            .slices
            .append(vec![square_at(5000, 1000), square_at(0, 1000)], SurfaceType::INTERNAL);
        layer.regions.push(region);
        layer.make_slices();
        assert_eq!(layer.lslices.len(), 2);
        // islands are visited nearest-first from the first centroid
        assert!(layer.lslices[0].contour.bounding_box().min.x > layer.lslices[1].contour.bounding_box().min.x);
    }
}
