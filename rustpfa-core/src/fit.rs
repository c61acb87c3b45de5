//! Straight-line fits through cluster hits and layer centroids.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use crate::cluster::Cluster;
use crate::hit::{CaloHitStore, PseudoLayer};
use crate::vector::CartesianVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single point entering a fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterFitPoint {
    /// Point position.
    pub position: CartesianVector,
    /// Local direction (cell normal) used to orient the fit frame.
    pub direction: CartesianVector,
    /// Cell size used to normalise residuals.
    pub cell_size: f32,
    /// Energy carried by the point.
    pub energy: f32,
    /// Pseudo-layer of the point.
    pub pseudo_layer: PseudoLayer,
}

/// Outcome of a straight-line fit.
///
/// The default value is an unsuccessful fit with zero direction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterFitResult {
    /// Whether the fit may be used.
    pub is_successful: bool,
    /// Unit direction of the fitted line.
    pub direction: CartesianVector,
    /// A point on the fitted line.
    pub intercept: CartesianVector,
    /// Mean squared transverse residual in units of cell size.
    pub chi2: f32,
    /// Root mean squared transverse residual.
    pub rms: f32,
    /// Cosine between the direction and the radial direction of the intercept.
    pub dir_cos_r: f32,
}

impl ClusterFitResult {
    /// A successful result carrying only a direction.
    #[must_use]
    pub fn from_direction(direction: CartesianVector) -> Self {
        Self {
            is_successful: true,
            direction,
            ..Self::default()
        }
    }

    /// Overrides the success flag.
    #[must_use]
    pub fn with_success(mut self, is_successful: bool) -> Self {
        self.is_successful = is_successful;
        self
    }
}

/// Two unit vectors completing `axis` to a right-handed orthonormal frame.
fn transverse_basis(axis: &CartesianVector) -> (CartesianVector, CartesianVector) {
    let helper = if axis.x.abs() < 0.9 {
        CartesianVector::new(1.0, 0.0, 0.0)
    } else {
        CartesianVector::new(0.0, 1.0, 0.0)
    };
    let u = axis.cross(&helper).unit();
    let v = axis.cross(&u);
    (u, v)
}

/// Fits a straight line through the points.
///
/// Both transverse coordinates are fitted linearly against the longitudinal
/// coordinate in a frame aligned with the mean point direction, so the
/// resulting direction points the same way as the inputs. Returns `None`
/// for fewer than two points or when all points share one longitudinal
/// coordinate.
#[must_use]
pub fn fit_points(points: &[ClusterFitPoint]) -> Option<ClusterFitResult> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f32;
    let central_position = points.iter().map(|p| p.position).sum::<CartesianVector>() * (1.0 / n);
    let axis = points
        .iter()
        .map(|p| p.direction)
        .sum::<CartesianVector>()
        .try_unit()
        .or_else(|| central_position.try_unit())
        .unwrap_or(CartesianVector::new(0.0, 0.0, 1.0));
    let (u, v) = transverse_basis(&axis);

    let coordinates: Vec<(f64, f64, f64)> = points
        .iter()
        .map(|point| {
            let offset = point.position - central_position;
            (
                f64::from(offset.dot(&u)),
                f64::from(offset.dot(&v)),
                f64::from(offset.dot(&axis)),
            )
        })
        .collect();

    let n = f64::from(n);
    let (mut sum_p, mut sum_q, mut sum_r) = (0.0_f64, 0.0_f64, 0.0_f64);
    let (mut sum_pr, mut sum_qr, mut sum_rr) = (0.0_f64, 0.0_f64, 0.0_f64);
    for &(p, q, r) in &coordinates {
        sum_p += p;
        sum_q += q;
        sum_r += r;
        sum_pr += p * r;
        sum_qr += q * r;
        sum_rr += r * r;
    }

    let denominator = n * sum_rr - sum_r * sum_r;
    if denominator.abs() < 1e-6 {
        return None;
    }

    let slope_p = (n * sum_pr - sum_r * sum_p) / denominator;
    let slope_q = (n * sum_qr - sum_r * sum_q) / denominator;
    let offset_p = (sum_p - slope_p * sum_r) / n;
    let offset_q = (sum_q - slope_q * sum_r) / n;

    let mut sum_squared = 0.0_f64;
    let mut sum_chi2 = 0.0_f64;
    for (point, &(p, q, r)) in points.iter().zip(&coordinates) {
        let residual_p = p - offset_p - slope_p * r;
        let residual_q = q - offset_q - slope_q * r;
        let squared = residual_p * residual_p + residual_q * residual_q;
        sum_squared += squared;
        let cell_size = f64::from(point.cell_size);
        sum_chi2 += if cell_size > 0.0 {
            squared / (cell_size * cell_size)
        } else {
            squared
        };
    }

    let direction = (u * slope_p as f32 + v * slope_q as f32 + axis).unit();
    let intercept = central_position + u * offset_p as f32 + v * offset_q as f32;

    Some(ClusterFitResult {
        is_successful: true,
        direction,
        intercept,
        chi2: (sum_chi2 / n) as f32,
        rms: (sum_squared / n).sqrt() as f32,
        dir_cos_r: direction.cos_opening_angle(&intercept),
    })
}

/// Fits the layer centroids of the occupied layers in `[first, last]`.
#[must_use]
pub fn fit_layer_centroids(
    cluster: &Cluster,
    store: &CaloHitStore,
    first: PseudoLayer,
    last: PseudoLayer,
) -> Option<ClusterFitResult> {
    let mut points = Vec::new();

    for (layer, hits) in cluster.ordered_hits().iter() {
        if layer < first {
            continue;
        }
        if layer > last {
            break;
        }
        let Some(centroid) = cluster.centroid(layer) else {
            continue;
        };

        let mut normal_sum = CartesianVector::ZERO;
        let mut cell_size_sum = 0.0_f32;
        let mut energy = 0.0_f32;
        for &id in hits {
            let hit = &store[id];
            normal_sum += hit.cell_normal();
            cell_size_sum += hit.cell_length_scale();
            energy += hit.input_energy();
        }

        points.push(ClusterFitPoint {
            position: centroid,
            direction: normal_sum.unit(),
            cell_size: cell_size_sum / hits.len() as f32,
            energy,
            pseudo_layer: layer,
        });
    }

    fit_points(&points)
}

/// Fits every hit in the first `max_occupied_layers` occupied layers.
#[must_use]
pub fn fit_start(
    cluster: &Cluster,
    store: &CaloHitStore,
    max_occupied_layers: usize,
) -> Option<ClusterFitResult> {
    if max_occupied_layers < 2 || cluster.ordered_hits().n_layers() < 2 {
        return None;
    }

    let points: Vec<ClusterFitPoint> = cluster
        .ordered_hits()
        .iter()
        .take(max_occupied_layers)
        .flat_map(|(layer, hits)| {
            hits.iter().map(move |&id| {
                let hit = &store[id];
                ClusterFitPoint {
                    position: hit.position(),
                    direction: hit.cell_normal(),
                    cell_size: hit.cell_length_scale(),
                    energy: hit.input_energy(),
                    pseudo_layer: layer,
                }
            })
        })
        .collect();

    fit_points(&points)
}
