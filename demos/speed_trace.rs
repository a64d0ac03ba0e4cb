//! Runs the self tuning speed controller against a simulated permanent
//! magnet motor and writes the result to `speed_trace.mcap`, one CBOR
//! message per speed loop tick.

use std::{
    borrow::Cow, cell::Cell, collections::BTreeMap, fs::File, io::BufWriter, rc::Rc, sync::Arc,
};

use foc_core::{
    current_gains::set_current_pid_gains,
    park_clarke::{clarke, inverse_clarke, inverse_park, park, RotatingFrame, ThreePhase},
    pid::PidTunings,
    trigonometry::wrap_angle,
    units::{
        Ampere, Hertz, MilliHenry, NyquistFactor, Ohm, PhaseCurrents, PhasePwmDutyCycles,
        Radians, RadiansPerSecond, Volts,
    },
    FieldOrientedController, FocWithSpeedPidAndRealTimeTune, LowPriorityInterrupt, SpeedControl,
};
use serde::Serialize;

const PWM: Hertz = Hertz(10_000);
const NYQUIST: u8 = 10;
const VDC: f32 = 24.0;
const RESISTANCE: f32 = 0.5;
const INDUCTANCE: f32 = 1e-3;
const POLE_PAIRS: u8 = 4;
const TORQUE_CONSTANT: f32 = 0.1;
const INERTIA: f32 = 2e-4;
const FRICTION: f32 = 1e-3;

#[derive(Serialize)]
struct Values {
    time_ns: u64,
    target_speed: f32,
    speed: f32,
    measured_speed: f32,
    id: f32,
    iq: f32,
    duty_cycles: [u8; 3],
    speed_kp: f32,
    speed_ki: f32,
    tuned: bool,
}

/// Pends the deferred work; the main loop plays the low priority handler.
struct PendingFlag(Rc<Cell<bool>>);

impl LowPriorityInterrupt for PendingFlag {
    fn trigger(&mut self) {
        self.0.set(true);
    }
}

/// Motor in its rotor frame, integrated with forward Euler at the PWM rate.
#[derive(Default)]
struct Motor {
    id: f32,
    iq: f32,
    speed: f32,
    position: f32,
}

impl Motor {
    fn electrical_angle(&self) -> f32 {
        self.position * f32::from(POLE_PAIRS)
    }

    fn phase_currents(&self) -> PhaseCurrents {
        let angle = self.electrical_angle();
        let phases = inverse_clarke(inverse_park(
            angle.cos(),
            angle.sin(),
            RotatingFrame {
                d: self.id,
                q: self.iq,
            },
        ));
        PhaseCurrents::new(Ampere(phases.a), Ampere(phases.b), Ampere(phases.c))
    }

    fn step(&mut self, duty_cycles: PhasePwmDutyCycles, dt: f32) {
        let [a, b, c] = duty_cycles.as_array().map(|duty| f32::from(duty) * 0.01 * VDC);
        let angle = self.electrical_angle();
        let voltage = park(angle.cos(), angle.sin(), clarke(ThreePhase { a, b, c }));

        let electrical_speed = self.speed * f32::from(POLE_PAIRS);
        let flux = TORQUE_CONSTANT / (1.5 * f32::from(POLE_PAIRS));
        let did = (voltage.d - RESISTANCE * self.id + electrical_speed * INDUCTANCE * self.iq)
            / INDUCTANCE;
        let diq = (voltage.q
            - RESISTANCE * self.iq
            - electrical_speed * (INDUCTANCE * self.id + flux))
            / INDUCTANCE;
        self.id += did * dt;
        self.iq += diq * dt;

        let torque = TORQUE_CONSTANT * self.iq;
        self.speed += (torque - FRICTION * self.speed) / INERTIA * dt;
        self.position += self.speed * dt;
    }
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let mut writer = mcap::Writer::new(BufWriter::new(File::create("speed_trace.mcap")?))?;
    let channel = mcap::Channel {
        topic: String::from("speed"),
        schema: Some(Arc::new(mcap::Schema {
            name: "".to_owned(),
            encoding: "".to_owned(),
            data: Cow::default(),
        })),
        message_encoding: "cbor".to_owned(),
        metadata: BTreeMap::default(),
    };
    let channel_id = writer.add_channel(&channel)?;

    let pending = Rc::new(Cell::new(false));
    let mut controller = FocWithSpeedPidAndRealTimeTune::with_real_time_tune(
        PendingFlag(pending.clone()),
        Ampere(5.0),
        PWM,
        NyquistFactor::new(NYQUIST),
    );
    controller.set_pole_pairs(POLE_PAIRS);
    set_current_pid_gains(
        &mut controller,
        Volts(VDC),
        Ohm(RESISTANCE),
        MilliHenry(INDUCTANCE * 1000.0),
        PWM,
        NyquistFactor::new(15),
    );
    // a deliberately soft start; the tuner takes over once it has a model
    controller.set_speed_tunings(&PidTunings::new(0.005, 0.05, 0.0));
    controller.enable();

    let mut motor = Motor::default();
    let dt = PWM.period();
    let samples = 3 * PWM.value();

    for sample in 0..samples {
        let time_ns = u64::from(sample) * 1_000_000_000 / u64::from(PWM.value());
        // alternate between two speeds to keep the estimator excited
        let target_speed = if (sample / (PWM.value() / 4)) % 2 == 0 {
            RadiansPerSecond(100.0)
        } else {
            RadiansPerSecond(200.0)
        };
        controller.set_point(target_speed);

        let duty_cycles =
            controller.calculate(motor.phase_currents(), Radians(wrap_angle(motor.position)));
        if pending.replace(false) {
            controller.service_deferred();
        }
        motor.step(duty_cycles, dt);

        if sample % u32::from(NYQUIST) != 0 {
            continue;
        }

        let tunings = controller.applied_speed_tunings();
        let mut buffer = Vec::with_capacity(128);
        ciborium::into_writer(
            &Values {
                time_ns,
                target_speed: target_speed.value(),
                speed: motor.speed,
                measured_speed: controller.speed().value(),
                id: motor.id,
                iq: motor.iq,
                duty_cycles: duty_cycles.as_array(),
                speed_kp: tunings.kp,
                speed_ki: tunings.ki,
                tuned: controller.observer().tunings().is_some(),
            },
            &mut buffer,
        )?;
        writer.write_to_known_channel(
            &mcap::records::MessageHeader {
                channel_id,
                sequence: sample / u32::from(NYQUIST),
                log_time: time_ns,
                publish_time: time_ns,
            },
            &buffer,
        )?;
    }

    writer.finish()?;
    println!(
        "final speed {:.1} rad/s, speed gains {:?}",
        motor.speed,
        controller.observer().tunings()
    );

    Ok(())
}
