use nalgebra::Vector4;

/// Seam to the vehicle's actuators.
///
/// The altitude-hold loop only ever commands collective thrust, so the four
/// values are always identical; the trait still takes the full vector so an
/// implementation can feed a mixer or a per-motor protocol directly.
pub trait MotorOutput {
    /// Output one value per motor, each in [0, 1].
    fn set_motors(&mut self, outputs: Vector4<f64>);
}

impl<M: MotorOutput + ?Sized> MotorOutput for &mut M {
    fn set_motors(&mut self, outputs: Vector4<f64>) {
        (**self).set_motors(outputs)
    }
}
