// ds-core/src/units.rs

use uom::si::f64::{
    AngularVelocity as UomAngularVelocity, Capacitance as UomCapacitance,
    ElectricCurrent as UomElectricCurrent, ElectricPotential as UomElectricPotential,
    ElectricalResistance as UomElectricalResistance, Frequency as UomFrequency,
    Inductance as UomInductance, MagneticFlux as UomMagneticFlux,
    MomentOfInertia as UomMomentOfInertia, Time as UomTime, Torque as UomTorque,
};

// Public canonical unit types (SI, f64)
pub type AngularVelocity = UomAngularVelocity;
pub type Capacitance = UomCapacitance;
pub type Current = UomElectricCurrent;
pub type Flux = UomMagneticFlux;
pub type Frequency = UomFrequency;
pub type Inductance = UomInductance;
pub type Inertia = UomMomentOfInertia;
pub type Resistance = UomElectricalResistance;
pub type Time = UomTime;
pub type Torque = UomTorque;
pub type Voltage = UomElectricPotential;

#[inline]
pub fn volts(v: f64) -> Voltage {
    use uom::si::electric_potential::volt;
    Voltage::new::<volt>(v)
}

#[inline]
pub fn amperes(v: f64) -> Current {
    use uom::si::electric_current::ampere;
    Current::new::<ampere>(v)
}

#[inline]
pub fn ohms(v: f64) -> Resistance {
    use uom::si::electrical_resistance::ohm;
    Resistance::new::<ohm>(v)
}

#[inline]
pub fn henries(v: f64) -> Inductance {
    use uom::si::inductance::henry;
    Inductance::new::<henry>(v)
}

#[inline]
pub fn farads(v: f64) -> Capacitance {
    use uom::si::capacitance::farad;
    Capacitance::new::<farad>(v)
}

#[inline]
pub fn webers(v: f64) -> Flux {
    use uom::si::magnetic_flux::weber;
    Flux::new::<weber>(v)
}

#[inline]
pub fn s(v: f64) -> Time {
    use uom::si::time::second;
    Time::new::<second>(v)
}

#[inline]
pub fn hz(v: f64) -> Frequency {
    use uom::si::frequency::hertz;
    Frequency::new::<hertz>(v)
}

#[inline]
pub fn rad_per_s(v: f64) -> AngularVelocity {
    use uom::si::angular_velocity::radian_per_second;
    AngularVelocity::new::<radian_per_second>(v)
}

#[inline]
pub fn nm(v: f64) -> Torque {
    use uom::si::torque::newton_meter;
    Torque::new::<newton_meter>(v)
}

#[inline]
pub fn kg_m2(v: f64) -> Inertia {
    use uom::si::moment_of_inertia::kilogram_square_meter;
    Inertia::new::<kilogram_square_meter>(v)
}
