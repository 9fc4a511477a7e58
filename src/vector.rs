use crate::backend::VectorOps;
use crate::error::{Result, TilingError};
use crate::geometry::{Coord, MultiPolygon, Polygon};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{
    FieldValue, Geometry, LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType,
};
use gdal::{Dataset, DriverManager};
use log::debug;
use std::fs;
use std::path::Path;

const DRIVER: &str = "GPKG";
const LAYER_NAME: &str = "tile";

/// GDAL/OGR-backed vector operations writing single-layer GeoPackages.
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalVector;

fn ring_coords(ring: &Geometry) -> Vec<Coord> {
    ring.get_point_vec().into_iter().map(|(x, y, _)| (x, y)).collect()
}

fn polygon_from_ogr(geom: &Geometry) -> Option<Polygon> {
    let ring_count = geom.geometry_count();
    if ring_count == 0 {
        return None;
    }
    let exterior = ring_coords(&geom.get_geometry(0));
    let interiors = (1..ring_count)
        .map(|i| ring_coords(&geom.get_geometry(i)))
        .collect();
    Some(Polygon::new(exterior, interiors))
}

fn collect_polygons(geom: &Geometry, out: &mut Vec<Polygon>) {
    match geom.geometry_name().as_str() {
        "POLYGON" => out.extend(polygon_from_ogr(geom)),
        "MULTIPOLYGON" | "GEOMETRYCOLLECTION" => {
            for i in 0..geom.geometry_count() {
                collect_polygons(&geom.get_geometry(i), out);
            }
        }
        other => debug!("Ignoring {} geometry in footprint", other),
    }
}

fn ring_wkt(ring: &[Coord]) -> String {
    let coords: Vec<String> = ring.iter().map(|(x, y)| format!("{} {}", x, y)).collect();
    format!("({})", coords.join(", "))
}

/// WKT of a multipolygon, always emitted as MULTIPOLYGON.
pub fn to_wkt(geometry: &MultiPolygon) -> String {
    let parts: Vec<String> = geometry
        .0
        .iter()
        .map(|p| {
            let rings: Vec<String> = std::iter::once(&p.exterior)
                .chain(p.interiors.iter())
                .map(|r| ring_wkt(r))
                .collect();
            format!("({})", rings.join(", "))
        })
        .collect();
    format!("MULTIPOLYGON ({})", parts.join(", "))
}

impl VectorOps for GdalVector {
    fn read_polygons(&self, path: &Path) -> Result<MultiPolygon> {
        let dataset = Dataset::open(path).map_err(|e| TilingError::unavailable(path, e))?;
        let mut layer = dataset.layer(0).map_err(|e| TilingError::unavailable(path, e))?;

        let mut polygons = Vec::new();
        for feature in layer.features() {
            if let Some(geom) = feature.geometry() {
                collect_polygons(geom, &mut polygons);
            }
        }
        debug!("Read {} polygon(s) from {}", polygons.len(), path.display());
        Ok(MultiPolygon(polygons))
    }

    fn simplify(&self, geometry: &MultiPolygon, tolerance: f64) -> Result<MultiPolygon> {
        let geom = Geometry::from_wkt(&to_wkt(geometry))?;
        let simplified = geom.simplify_preserve_topology(tolerance)?;
        let mut polygons = Vec::new();
        collect_polygons(&simplified, &mut polygons);
        Ok(MultiPolygon(polygons))
    }

    fn write_polygon(
        &self,
        path: &Path,
        geometry: &MultiPolygon,
        epsg: Option<u32>,
        fields: &[(&str, i64)],
    ) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)?;
        }

        let driver = DriverManager::get_driver_by_name(DRIVER)?;
        let mut dataset = driver.create_vector_only(path)?;
        let srs = epsg.map(SpatialRef::from_epsg).transpose()?;

        let mut layer = dataset.create_layer(LayerOptions {
            name: LAYER_NAME,
            srs: srs.as_ref(),
            ty: OGRwkbGeometryType::wkbMultiPolygon,
            options: None,
        })?;

        let defs: Vec<(&str, OGRFieldType::Type)> = fields
            .iter()
            .map(|(name, _)| (*name, OGRFieldType::OFTInteger64))
            .collect();
        layer.create_defn_fields(&defs)?;

        let names: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
        let values: Vec<FieldValue> = fields
            .iter()
            .map(|(_, v)| FieldValue::Integer64Value(*v))
            .collect();
        let geom = Geometry::from_wkt(&to_wkt(geometry))?;
        layer.create_feature_fields(geom, &names, &values)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Extent;

    #[test]
    fn test_to_wkt_single_square() {
        let mp = MultiPolygon::from(Extent::new(0.0, 1.0, 0.0, 2.0).to_polygon());
        assert_eq!(
            to_wkt(&mp),
            "MULTIPOLYGON (((0 0, 1 0, 1 2, 0 2, 0 0)))"
        );
    }

    #[test]
    fn test_to_wkt_with_hole() {
        let outer = Extent::new(0.0, 4.0, 0.0, 4.0).to_ring();
        let hole = Extent::new(1.0, 2.0, 1.0, 2.0).to_ring();
        let mp = MultiPolygon::from(Polygon::new(outer, vec![hole]));
        let wkt = to_wkt(&mp);
        assert!(wkt.starts_with("MULTIPOLYGON (((0 0"));
        assert!(wkt.contains("), (1 1, 2 1, 2 2, 1 2, 1 1)))"));
    }
}
