//! Sensor data carried through the graph.
//!
//! The store keeps sensor payloads opaque: point clouds arrive already
//! preprocessed in the tracking frame, and IMU samples are forwarded to the
//! optimization problem untouched.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Points of one scan, in the tracking frame.
pub type PointCloud = Vec<Point3<f32>>;

/// One inertial measurement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Capture time in microseconds.
    pub time_us: u64,
    /// Linear acceleration in m/s².
    pub linear_acceleration: Vector3<f64>,
    /// Angular velocity in rad/s.
    pub angular_velocity: Vector3<f64>,
}

impl ImuSample {
    pub fn new(
        time_us: u64,
        linear_acceleration: Vector3<f64>,
        angular_velocity: Vector3<f64>,
    ) -> Self {
        Self {
            time_us,
            linear_acceleration,
            angular_velocity,
        }
    }
}
