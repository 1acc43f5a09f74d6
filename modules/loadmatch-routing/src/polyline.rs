//! Encoded polyline decoding (precision 1e-5) and WKT rendering.

use loadmatch_common::GeoPoint;

use crate::error::DirectionsError;

pub fn decode(encoded: &str) -> Result<Vec<GeoPoint>, DirectionsError> {
    let mut bytes = encoded.bytes();
    let mut points = Vec::new();
    let (mut lat, mut lng) = (0i64, 0i64);

    loop {
        let Some(d_lat) = next_value(&mut bytes)? else {
            break;
        };
        let d_lng = next_value(&mut bytes)?
            .ok_or_else(|| DirectionsError::Parse("polyline ends after a latitude".into()))?;
        lat += d_lat;
        lng += d_lng;
        points.push(GeoPoint::new(lat as f64 / 1e5, lng as f64 / 1e5));
    }
    Ok(points)
}

/// One zig-zag varint. `None` at a clean end of input.
fn next_value(bytes: &mut impl Iterator<Item = u8>) -> Result<Option<i64>, DirectionsError> {
    let mut result: i64 = 0;
    let mut shift = 0;
    let mut started = false;

    loop {
        let Some(byte) = bytes.next() else {
            if started {
                return Err(DirectionsError::Parse("truncated polyline".into()));
            }
            return Ok(None);
        };
        if !(63..=126).contains(&byte) || shift > 60 {
            return Err(DirectionsError::Parse(format!("invalid polyline byte {byte}")));
        }
        started = true;
        let chunk = i64::from(byte - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }

    let value = if result & 1 == 1 { !(result >> 1) } else { result >> 1 };
    Ok(Some(value))
}

/// `LINESTRING(lng lat, lng lat, ...)`, the form the relational store's
/// geography column accepts.
pub fn linestring(points: &[GeoPoint]) -> String {
    let coords: Vec<String> = points.iter().map(|p| format!("{} {}", p.lng, p.lat)).collect();
    format!("LINESTRING({})", coords.join(", "))
}
