use std::thread;
use std::time::{Duration, Instant};

use log::info;
use rppal::gpio::{Gpio, InputPin, OutputPin};

use rig_core::config::{PinConfig, TrackingConfig};
use rig_core::ports::{Clock, DigitalInput, DigitalOutput, ServoOutput};
use rig_core::{ActuatorState, PanTiltServos, RigError, RigResult};

fn gpio_err(context: &str, e: rppal::gpio::Error) -> RigError {
    RigError::hardware(format!("{}: {}", context, e))
}

/// Microseconds since the clock was created, backed by `Instant`.
#[derive(Debug, Clone, Copy)]
pub struct PiClock {
    origin: Instant,
}

impl PiClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for PiClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for PiClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    // thread::sleep overshoots by far more than a trigger pulse lasts
    fn delay_us(&self, us: u64) {
        let until = Instant::now() + Duration::from_micros(us);
        while Instant::now() < until {
            std::hint::spin_loop();
        }
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub struct GpioOutput(OutputPin);

impl DigitalOutput for GpioOutput {
    fn write(&mut self, high: bool) -> RigResult<()> {
        if high {
            self.0.set_high();
        } else {
            self.0.set_low();
        }
        Ok(())
    }
}

pub struct GpioInput(InputPin);

impl DigitalInput for GpioInput {
    fn is_high(&self) -> bool {
        self.0.is_high()
    }
}

/// Hobby servo on any GPIO pin using rppal's software PWM.
pub struct SoftServo {
    pin: OutputPin,
    period: Duration,
}

impl ServoOutput for SoftServo {
    fn set_pulse_width_us(&mut self, pulse_us: u32) -> RigResult<()> {
        self.pin
            .set_pwm(self.period, Duration::from_micros(pulse_us as u64))
            .map_err(|e| gpio_err("servo pwm", e))
    }
}

/// Every GPIO line the rig uses, claimed in one go.
pub struct PiRig {
    pub servos: PanTiltServos<SoftServo>,
    pub trigger: GpioOutput,
    pub echo: GpioInput,
    pub led: GpioOutput,
}

impl PiRig {
    pub fn open(pins: &PinConfig, tracking: &TrackingConfig) -> RigResult<Self> {
        let gpio = Gpio::new().map_err(|e| gpio_err("gpio init", e))?;
        let period = Duration::from_millis(tracking.servo_period_ms);

        let output = |pin: u8| -> RigResult<OutputPin> {
            gpio.get(pin)
                .map(|p| p.into_output_low())
                .map_err(|e| gpio_err(&format!("gpio {}", pin), e))
        };

        let servos = PanTiltServos::new(
            SoftServo {
                pin: output(pins.pan_servo)?,
                period,
            },
            SoftServo {
                pin: output(pins.tilt_servo)?,
                period,
            },
        );
        let trigger = GpioOutput(output(pins.trigger)?);
        let led = GpioOutput(output(pins.led)?);
        let echo = GpioInput(
            gpio.get(pins.echo)
                .map_err(|e| gpio_err(&format!("gpio {}", pins.echo), e))?
                .into_input(),
        );

        let mut rig = Self {
            servos,
            trigger,
            echo,
            led,
        };
        rig.servos
            .apply(ActuatorState::centered(tracking.initial_cmd))?;

        info!(
            "GPIO ready: pan {}, tilt {}, trig {}, echo {}, led {}",
            pins.pan_servo, pins.tilt_servo, pins.trigger, pins.echo, pins.led
        );
        Ok(rig)
    }

    /// Only the lines the ultrasonic bring-up loop needs.
    pub fn open_ranging(pins: &PinConfig) -> RigResult<(GpioOutput, GpioInput, GpioOutput)> {
        let gpio = Gpio::new().map_err(|e| gpio_err("gpio init", e))?;
        let get = |pin: u8| gpio.get(pin).map_err(|e| gpio_err(&format!("gpio {}", pin), e));

        let trigger = GpioOutput(get(pins.trigger)?.into_output_low());
        let echo = GpioInput(get(pins.echo)?.into_input());
        let led = GpioOutput(get(pins.led)?.into_output_low());

        info!(
            "GPIO ready: trig {}, echo {}, led {}",
            pins.trigger, pins.echo, pins.led
        );
        Ok((trigger, echo, led))
    }
}
