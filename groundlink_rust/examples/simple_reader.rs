use groundlink_core::pipeline::LinkEvent;
use groundlink_rust::GroundClient;
use groundlink_rust::transport::available_port_names;
use std::{process::exit, time::Duration};

fn main() {
    let ports = available_port_names().expect("No ports found!");

    if ports.is_empty() {
        eprintln!("No serial ports detected");
        exit(1);
    }

    let port_name = &ports[0];
    println!("Connecting to {}", port_name);

    let mut client = match GroundClient::new(port_name, 9600, Duration::from_millis(100)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to open {}: {:#}", port_name, e);
            exit(1);
        }
    };
    client.start();

    loop {
        if let Ok(events) = client.get_events(Some(Duration::from_millis(100))) {
            for event in events {
                match event {
                    LinkEvent::Telemetry(record) => println!("{:#?}", record),
                    other => println!("{:?}", other),
                }
            }
        }

        if let Some(err) = client.check_error() {
            eprintln!("Error: {}", err);
            break;
        }
    }
}
