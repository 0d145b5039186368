//! BDD step definitions for series derivation feature

use cucumber::{given, then, when};

use sensorhub::sensors::SensorRecord;
use sensorhub::series::SeriesBinder;

use crate::world::SensorhubWorld;

fn parse_values(values: &str) -> Vec<f64> {
    values
        .split(',')
        .map(|v| v.trim().parse().expect("not a number"))
        .collect()
}

fn binder(world: &mut SensorhubWorld) -> &mut SeriesBinder {
    let records = world.records.clone();
    world.binder.get_or_insert_with(|| SeriesBinder::new(records))
}

#[given(expr = "a sensor {string} with payload {string}")]
fn sensor_with_payload(world: &mut SensorhubWorld, sensor_id: String, payload: String) {
    world.records.push(SensorRecord {
        sensor_id,
        display_name: String::new(),
        data: payload,
    });
}

#[when(expr = "sensor {string} is selected")]
fn select_sensor(world: &mut SensorhubWorld, sensor_id: String) {
    binder(world).select_record(Some(&sensor_id));
}

#[when(expr = "field {string} is selected")]
fn select_field(world: &mut SensorhubWorld, field: String) {
    let accepted = binder(world).select_primary(Some(&field));
    world.last_selection_accepted = Some(accepted);
}

#[when(expr = "second field {string} is selected")]
fn select_second_field(world: &mut SensorhubWorld, field: String) {
    let accepted = binder(world).select_secondary(Some(&field));
    world.last_selection_accepted = Some(accepted);
}

#[then(expr = "the x values are {string}")]
fn x_values(world: &mut SensorhubWorld, expected: String) {
    let plot = binder(world).plot().expect("no plot").clone();
    assert_eq!(plot.x, parse_values(&expected));
}

#[then(expr = "the y values of {string} are {string}")]
fn y_values(world: &mut SensorhubWorld, field: String, expected: String) {
    let plot = binder(world).plot().expect("no plot").clone();
    let series = plot
        .series
        .iter()
        .find(|s| s.label == field)
        .expect("no such series");
    assert_eq!(series.y, parse_values(&expected));
}

#[then(expr = "the x axis is labelled {string}")]
fn x_label(world: &mut SensorhubWorld, label: String) {
    let plot = binder(world).plot().expect("no plot").clone();
    assert_eq!(plot.x_label, label);
}

#[then(expr = "the plot has {int} series")]
fn series_count(world: &mut SensorhubWorld, count: usize) {
    let plot = binder(world).plot().expect("no plot").clone();
    assert_eq!(plot.series.len(), count);
}

#[then("there are no candidate fields")]
fn no_candidates(world: &mut SensorhubWorld) {
    assert!(binder(world).candidates().is_empty());
}

#[then(expr = "the candidate fields are {string}")]
fn candidates(world: &mut SensorhubWorld, expected: String) {
    let expected: Vec<String> = expected.split(',').map(|f| f.trim().to_string()).collect();
    assert_eq!(binder(world).candidates(), expected.as_slice());
}

#[then("no plot is shown")]
fn no_plot(world: &mut SensorhubWorld) {
    assert!(binder(world).plot().is_none());
}

#[then("the second field picker is hidden")]
fn second_picker_hidden(world: &mut SensorhubWorld) {
    assert!(!binder(world).secondary_available());
}

#[then("no field is selected")]
fn no_field_selected(world: &mut SensorhubWorld) {
    let selection = binder(world).selection();
    assert_eq!(selection.primary, None);
    assert_eq!(selection.secondary, None);
}

#[then("the selection is rejected")]
fn selection_rejected(world: &mut SensorhubWorld) {
    assert_eq!(world.last_selection_accepted, Some(false));
}
