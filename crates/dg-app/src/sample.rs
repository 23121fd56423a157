//! Sample sensor telemetry used by the demo

use serde_json::{json, Value};

use dg_data::{Column, ColumnType, GridConfig, Variant};

const SENSORS: [&str; 4] = ["north-01", "north-02", "south-01", "east-07"];
const STATUSES: [&str; 3] = ["ok", "warning", "offline"];

/// `count` telemetry readings, one minute apart
pub fn sensor_readings(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            let minute = i % 60;
            let hour = (i / 60) % 24;
            json!({
                "id": i,
                "timestamp": format!("2024-03-{:02}T{hour:02}:{minute:02}:00Z", 1 + i / 1440),
                "sensor": {
                    "id": SENSORS[i % SENSORS.len()],
                    "site": if i % 2 == 0 { "Plant A" } else { "Plant B" },
                },
                "temperature": 18.0 + (i % 17) as f64 * 0.75,
                "humidity": 0.35 + (i % 11) as f64 * 0.03,
                "online": i % 9 != 0,
                "status": STATUSES[i % STATUSES.len()],
            })
        })
        .collect()
}

pub fn sample_columns() -> Vec<Column> {
    vec![
        Column::new("id", "#").with_type(ColumnType::Number).with_width(60.0),
        Column::new("timestamp", "Time")
            .with_type(ColumnType::Date)
            .with_format("%d/%m %H:%M")
            .sortable(),
        Column::new("sensor.id", "Sensor").sortable().hideable(),
        Column::new("temperature", "Temp")
            .with_type(ColumnType::Number)
            .with_format("0.0")
            .sortable()
            .resizable(),
        Column::new("humidity", "Humidity")
            .with_type(ColumnType::Number)
            .with_format("0.0%")
            .hideable(),
        Column::new("online", "Online")
            .with_type(ColumnType::Bool)
            .with_format("yes;no"),
    ]
}

pub fn sample_config(variant: Variant) -> GridConfig {
    GridConfig {
        variant,
        height: "300px".to_string(),
        columns: sample_columns(),
        ..GridConfig::default()
    }
}
