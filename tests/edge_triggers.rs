use std::sync::{Arc, Mutex};

use solar_monitor::{
    Action, Coordinator, Edge, EdgeCrossing, EventHandler, EventTrigger, MonitorResult, Sample,
};

const BATTERY: &str = "Battery Voltage";
const CURRENT: &str = "Charge Current";

/// Records the value of one measurement for every sample it receives.
#[derive(Clone)]
struct Fired {
    measurement: &'static str,
    values: Arc<Mutex<Vec<f64>>>,
}

impl Fired {
    fn new(measurement: &'static str) -> Self {
        Self {
            measurement,
            values: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn values(&self) -> Vec<f64> {
        self.values.lock().unwrap().clone()
    }
}

impl Action for Fired {
    fn name(&self) -> &str {
        "fired"
    }

    fn run(&mut self, sample: &Sample) -> MonitorResult<()> {
        let value = sample.require(self.measurement)?.value;
        self.values.lock().unwrap().push(value);
        Ok(())
    }
}

fn sample(battery: f64, current: f64) -> Sample {
    Sample::builder("solar")
        .measurement(BATTERY, "Battery", battery, "V")
        .measurement(CURRENT, "Battery", current, "A")
        .build()
}

fn run(trigger_condition: EdgeCrossing, measurement: &'static str, readings: &[(f64, f64)]) -> Vec<f64> {
    let fired = Fired::new(measurement);
    let mut trigger = EventTrigger::new("edge", trigger_condition);
    trigger.append(EventHandler::new(fired.clone())).unwrap();

    let mut coordinator = Coordinator::new(vec![trigger]);
    coordinator.start_all().unwrap();
    for &(battery, current) in readings {
        coordinator.publish(sample(battery, current)).unwrap();
    }
    coordinator.stop_all().unwrap();
    fired.values()
}

fn battery_only(values: &[f64]) -> Vec<(f64, f64)> {
    values.iter().map(|v| (*v, 0.0)).collect()
}

#[test]
fn low_battery_fires_once_per_descent() {
    let fired = run(EdgeCrossing::battery_low(12.0), BATTERY, &battery_only(&[12.0, 11.9, 11.8]));
    assert_eq!(fired, vec![11.9]);
}

#[test]
fn full_battery_boundary_is_inclusive() {
    let crossing = run(EdgeCrossing::battery_full(25.0), BATTERY, &battery_only(&[24.0, 25.1]));
    assert_eq!(crossing, vec![25.1]);

    let bootstrap = run(EdgeCrossing::battery_full(25.0), BATTERY, &battery_only(&[25.0]));
    assert_eq!(bootstrap, vec![25.0]);
}

#[test]
fn oscillating_voltage_fires_on_every_genuine_crossing() {
    let readings = battery_only(&[12.4, 11.4, 11.3, 11.6, 11.5, 11.49, 12.0, 11.0, 10.9]);
    let fired = run(EdgeCrossing::battery_low(11.5), BATTERY, &readings);
    assert_eq!(fired, vec![11.4, 11.49, 11.0]);
}

#[test]
fn charge_current_ignores_battery_changes() {
    let readings = [(12.0, 2.0), (11.0, 3.0), (13.0, 15.0), (11.0, 16.0), (12.0, 4.0), (12.0, 15.5)];
    let fired = run(EdgeCrossing::charge_current_high(15.0), CURRENT, &readings);
    assert_eq!(fired, vec![15.0, 15.5]);
}

#[test]
fn custom_measurement_and_edge() {
    let condition = EdgeCrossing::new(CURRENT, 1.0, Edge::Falling);
    assert_eq!(condition.edge(), Edge::Falling);
    assert_eq!(condition.measurement(), CURRENT);

    let readings = [(12.0, 5.0), (12.0, 0.5), (12.0, 0.2), (12.0, 2.0), (12.0, 0.9)];
    assert_eq!(run(condition, CURRENT, &readings), vec![0.5, 0.9]);
}

#[test]
fn samples_without_the_measurement_are_skipped() {
    let fired = Fired::new(BATTERY);
    let mut trigger = EventTrigger::new("edge", EdgeCrossing::battery_low(12.0));
    trigger.append(EventHandler::new(fired.clone())).unwrap();
    let mut coordinator = Coordinator::new(vec![trigger]);
    coordinator.start_all().unwrap();

    coordinator.publish(sample(12.5, 0.0)).unwrap();
    coordinator
        .publish(Sample::builder("solar").measurement(CURRENT, "Battery", 1.0, "A").build())
        .unwrap();
    coordinator.publish(sample(11.5, 0.0)).unwrap();
    coordinator.stop_all().unwrap();

    assert_eq!(fired.values(), vec![11.5]);
}
