#![warn(missing_docs)]

//! Slicing pipeline for the strata slicer.
//!
//! Converts triangle meshes into ordered, classified 2D regions with
//! extrusion attributes attached: planar slices become layers, layers are
//! classified into top/bottom/internal surfaces, perimeters and infill are
//! generated per region, and support material is derived from detected
//! overhangs. The pipeline is incremental: configuration changes invalidate
//! exactly the steps whose inputs changed.
//!
//! # Example
//!
//! ```ignore
//! use strata_slicer::{model::model_from_mesh, print::Print};
//! use strata_config::DynamicConfig;
//!
//! let mut config = DynamicConfig::new();
//! config.set_deserialize("layer_height", "0.2")?;
//!
//! let mut print = Print::new();
//! print.apply_config(config)?;
//! print.set_model(model_from_mesh(mesh));
//! print.process()?;
//! ```

pub mod adaptive;
pub mod classify;
pub mod error;
pub mod extrusion;
pub mod fill;
pub mod flow;
pub mod infill;
pub mod layer;
pub mod layer_height;
pub mod model;
pub mod parallel;
pub mod perimeter;
pub mod print;
pub mod print_object;
pub mod spline;
pub mod steps;
pub mod support;
pub mod surface;
pub mod surface_collection;

pub use error::{Result, SlicerError};
pub use extrusion::{ExtrusionEntity, ExtrusionEntityCollection, ExtrusionLoop, ExtrusionPath, ExtrusionRole};
pub use flow::{Flow, FlowRole};
pub use layer::{Layer, LayerRegion, SupportLayer};
pub use model::{Model, ModelInstance, ModelMaterial, ModelObject, ModelVolume};
pub use parallel::{CancellationToken, Executor};
pub use print::{Print, PrintRegion, RegionKey};
pub use print_object::PrintObject;
pub use steps::{ObjectStep, PrintState, PrintStep};
pub use surface::{Surface, SurfaceDensity, SurfaceModifier, SurfacePosition, SurfaceType};
pub use surface_collection::SurfaceCollection;

#[cfg(test)]
mod tests {
    use crate::model::model_from_mesh;
    use crate::print::Print;
    use crate::steps::{ObjectStep, PrintStep};
    use approx::assert_relative_eq;
    use strata_config::DynamicConfig;
    use strata_mesh::{Facet, TriangleMesh, Vertex};

    fn print_for(mesh: TriangleMesh, edits: &[(&str, &str)]) -> Print {
        let mut config = DynamicConfig::new();
        for (k, v) in edits {
            config.set_deserialize(k, v).unwrap();
        }
        let mut print = Print::new();
        print.apply_config(config).unwrap();
        print.set_model(model_from_mesh(mesh));
        print
    }

    /// A 20mm cube with a 45° slope rising from z=2.92893 on the front
    /// face to a horizontal plateau at z=10, and a full-height tower
    /// behind it.
    fn make_slopy_cube() -> TriangleMesh {
        fn cuboid(x0: f64, y0: f64, z0: f64, x1: f64, y1: f64, z1: f64) -> TriangleMesh {
            let mut m = TriangleMesh::make_cube(x1 - x0, y1 - y0, z1 - z0);
            m.translate(x0 as f32, y0 as f32, z0 as f32);
            m
        }
        let slope_start = 2.92893f32;
        let y_knee: f32 = 20.0 - (10.0 - 2.92893); // where the slope reaches z=10

        // tower and plateau
        let mut mesh = cuboid(0.0, 0.0, 0.0, 20.0, 5.0, 20.0);
        mesh.merge(&cuboid(0.0, 5.0, 0.0, 20.0, y_knee as f64, 10.0));

        // wedge: quadrilateral profile in the YZ plane
        let profile = [
            (y_knee, 0.0f32),
            (20.0, 0.0),
            (20.0, slope_start),
            (y_knee, 10.0),
        ];
        let v = |i: usize, x: f32| {
            Vertex::new(x, profile[i].0, profile[i].1)
        };
        let mut wedge = Vec::new();
        // sides at x=0 and x=20
        for (x, flip) in [(0.0f32, false), (20.0, true)] {
            for tri in [[0usize, 1, 2], [0, 2, 3]] {
                let mut f = [v(tri[0], x), v(tri[1], x), v(tri[2], x)];
                if flip {
                    f.swap(1, 2);
                }
                wedge.push(Facet::new(f));
            }
        }
        // bottom, front, slope and back faces as quads
        let corners = |i: usize| (v(i, 0.0), v(i, 20.0));
        for (a, b) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
            let (a0, a1) = corners(a);
            let (b0, b1) = corners(b);
            wedge.push(Facet::new([a0, b0, b1]));
            wedge.push(Facet::new([a0, b1, a1]));
        }
        mesh.merge(&TriangleMesh::from_facets(wedge));
        mesh
    }

    #[test]
    fn test_full_pipeline_cube() {
        let mut print = print_for(
            TriangleMesh::make_cube(20.0, 20.0, 20.0),
            &[
                ("layer_height", "0.5"),
                ("first_layer_height", "0.5"),
                ("fill_density", "20%"),
                ("fill_pattern", "rectilinear"),
                ("skirts", "1"),
                ("brim_width", "3"),
                ("threads", "1"),
            ],
        );
        print.process().unwrap();

        let object = &print.objects[0];
        assert!(object.state.is_done(ObjectStep::Slice));
        assert!(object.state.is_done(ObjectStep::Perimeters));
        assert!(object.state.is_done(ObjectStep::DetectSurfaces));
        assert!(object.state.is_done(ObjectStep::PrepareInfill));
        assert!(object.state.is_done(ObjectStep::Infill));
        assert!(object.state.is_done(ObjectStep::SupportMaterial));
        assert!(print.state.is_done(PrintStep::Skirt));
        assert!(print.state.is_done(PrintStep::Brim));

        // strictly increasing Z with the first layer at its height
        let mut last = 0.0;
        for layer in &object.layers {
            assert!(layer.print_z > last);
            last = layer.print_z;
        }
        assert_relative_eq!(object.layers[0].print_z, 0.5, epsilon = 1e-9);
        assert_relative_eq!(object.layers.last().unwrap().print_z, 20.0, epsilon = 1e-9);

        // every layer has perimeters, the shells have fills
        for layer in &object.layers {
            assert!(!layer.regions[0].perimeters.is_empty());
        }
        assert!(!object.layers[0].regions[0].fills.is_empty());
        assert!(!print.skirt.is_empty());
        assert!(!print.brim.is_empty());
    }

    #[test]
    fn test_pipeline_is_rerunnable_after_invalidation() {
        let mut print = print_for(
            TriangleMesh::make_cube(10.0, 10.0, 10.0),
            &[
                ("layer_height", "0.5"),
                ("first_layer_height", "0.5"),
                ("threads", "1"),
            ],
        );
        print.process().unwrap();
        let layers_before = print.objects[0].layer_count();

        // a perimeters-only change reruns from perimeters on
        let mut config = DynamicConfig::new();
        config.set_deserialize("perimeters", "2").unwrap();
        assert!(print.apply_config(config).unwrap());
        assert!(print.objects[0].state.is_done(ObjectStep::Slice));
        assert!(!print.objects[0].state.is_done(ObjectStep::Perimeters));
        print.process().unwrap();
        assert_eq!(print.objects[0].layer_count(), layers_before);
    }

    #[test]
    fn test_cancellation_aborts_processing() {
        let mut print = print_for(
            TriangleMesh::make_cube(10.0, 10.0, 10.0),
            &[("layer_height", "0.5"), ("first_layer_height", "0.5")],
        );
        let token = crate::parallel::CancellationToken::new();
        print.set_cancellation_token(token.clone());
        token.cancel();
        assert!(matches!(
            print.process(),
            Err(crate::error::SlicerError::Cancelled)
        ));
    }

    #[test]
    fn test_mid_step_cancellation_rolls_back_the_step() {
        // cancel after slicing, so the next step observes the token while
        // it is already marked started; it must roll back to not-started
        let mut print = print_for(
            TriangleMesh::make_cube(10.0, 10.0, 10.0),
            &[("layer_height", "0.5"), ("first_layer_height", "0.5")],
        );
        let token = crate::parallel::CancellationToken::new();
        print.set_cancellation_token(token.clone());
        crate::print_object::slice_object(&mut print, 0).unwrap();
        assert!(print.objects[0].state.is_done(ObjectStep::Slice));

        token.cancel();
        let executor = print.executor();
        assert!(matches!(
            crate::perimeter::make_object_perimeters(&mut print, 0, &executor),
            Err(crate::error::SlicerError::Cancelled)
        ));
        assert!(!print.objects[0].state.is_started(ObjectStep::Perimeters));
        assert!(!print.objects[0].state.is_done(ObjectStep::Perimeters));
        // completed upstream work is untouched
        assert!(print.objects[0].state.is_done(ObjectStep::Slice));

        // clearing the token lets the pipeline finish from where it left off
        print.set_cancellation_token(crate::parallel::CancellationToken::new());
        print.process().unwrap();
        assert!(print.objects[0].state.is_done(ObjectStep::Infill));
    }

    #[test]
    fn test_infill_overlap_change_invalidates_perimeters() {
        // the overlap shapes the fill boundary emitted by the perimeter
        // generator, so changing it must regenerate perimeters too
        let mut print = print_for(
            TriangleMesh::make_cube(10.0, 10.0, 10.0),
            &[
                ("layer_height", "0.5"),
                ("first_layer_height", "0.5"),
                ("threads", "1"),
            ],
        );
        print.process().unwrap();
        let fill_area_before: f64 = print.objects[0].layers[5].regions[0]
            .fill_surfaces
            .surfaces
            .iter()
            .map(|s| s.area())
            .sum();

        let mut config = DynamicConfig::new();
        config.set_deserialize("infill_overlap", "200%").unwrap();
        assert!(print.apply_config(config).unwrap());
        assert!(!print.objects[0].state.is_started(ObjectStep::Perimeters));
        assert!(!print.objects[0].state.is_started(ObjectStep::Infill));

        print.process().unwrap();
        let fill_area_after: f64 = print.objects[0].layers[5].regions[0]
            .fill_surfaces
            .surfaces
            .iter()
            .map(|s| s.area())
            .sum();
        // a much larger overlap pushes the fill boundary outward
        assert!(fill_area_after > fill_area_before);
    }

    #[test]
    fn test_adaptive_slicing_lands_on_plateau() {
        // the horizontal face atop the slope at z=10 must be matched by a
        // layer boundary
        let mut print = print_for(
            make_slopy_cube(),
            &[
                ("adaptive_slicing", "1"),
                ("adaptive_slicing_quality", "81%"),
                ("match_horizontal_surfaces", "1"),
                ("first_layer_height", "0.42893"),
                ("nozzle_diameter", "0.5"),
                ("min_layer_height", "0.1"),
                ("max_layer_height", "0.5"),
                ("threads", "1"),
            ],
        );
        crate::print_object::slice_object(&mut print, 0).unwrap();
        let zs: Vec<f64> = print.objects[0].layers.iter().map(|l| l.print_z).collect();
        assert!(
            zs.iter().any(|z| (z - 10.0).abs() < 1e-4),
            "no layer boundary at the plateau; zs = {zs:?}"
        );
        // heights stay within the extruder limits
        let mut last = 0.0;
        for z in zs {
            let h = z - last;
            assert!(h >= 0.1 - 1e-6 || last == 0.0);
            assert!(h <= 0.5 + 1e-6);
            last = z;
        }
    }

    #[test]
    fn test_spiral_vase_normalized_options() {
        let print = print_for(
            TriangleMesh::make_cube(10.0, 10.0, 10.0),
            &[("spiral_vase", "1")],
        );
        let (_, region) = print.regions.iter().next().unwrap();
        assert_eq!(region.config.perimeters, 1);
        assert_eq!(region.config.top_solid_layers, 0);
        assert_eq!(region.config.fill_density, 0.0);
    }
}
