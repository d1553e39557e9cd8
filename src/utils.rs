// src/utils.rs
//
// Pure math helpers shared by the scorer and the clustering engine.

/// Cosine similarity between two vectors. Returns `None` when the lengths
/// differ, the vectors are empty, or either has zero magnitude.
pub fn cosine_similarity(v1: &[f32], v2: &[f32]) -> Option<f64> {
    if v1.len() != v2.len() || v1.is_empty() {
        return None;
    }
    let mut dot_product = 0.0;
    let mut mag1_sq = 0.0;
    let mut mag2_sq = 0.0;
    for i in 0..v1.len() {
        dot_product += (v1[i] as f64) * (v2[i] as f64);
        mag1_sq += (v1[i] as f64).powi(2);
        mag2_sq += (v2[i] as f64).powi(2);
    }
    let mag1 = mag1_sq.sqrt();
    let mag2 = mag2_sq.sqrt();
    if mag1 == 0.0 || mag2 == 0.0 {
        return None;
    }
    Some(dot_product / (mag1 * mag2))
}

/// Great-circle distance between two points in kilometers (Haversine).
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a =
        (dlat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Arithmetic mean of a slice; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
