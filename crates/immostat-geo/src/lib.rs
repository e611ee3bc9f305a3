//! Administrative-area geometry: approximate centroids per department,
//! used to seed the default map viewpoint.

pub mod centroid;
pub mod feature;
pub mod view;
