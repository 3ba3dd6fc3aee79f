use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uvcbridge::channel::{dispatch, MethodCall};
use uvcbridge::types::{CameraControl, PreviewOptions};
use uvcbridge::{BridgeConfig, CameraBridge};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    uvcbridge::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: uvcbridge-cli <list-devices|preview|call> [args]");
        std::process::exit(1);
    }

    let (bridge, _textures) = CameraBridge::native(BridgeConfig::load_or_default());

    let command = &args[1];
    match command.as_str() {
        "list-devices" => cmd_list_devices(&bridge, &args),
        "preview" => cmd_preview(&bridge, &args).await,
        "call" => cmd_call(&bridge, &args).await,
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn cmd_list_devices(bridge: &CameraBridge, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let devices = bridge.enumerate_devices();
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&devices)?);
    } else if devices.is_empty() {
        println!("No USB devices found");
    } else {
        for d in devices {
            println!("{}", d);
        }
    }
    Ok(())
}

async fn cmd_preview(bridge: &CameraBridge, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    // Parse args: preview [--index <n>] [--seconds <s>] [--brightness <v>] [--contrast <v>] [--json]
    let mut options = PreviewOptions::default();
    let mut seconds = 5u64;
    let mut brightness = None;
    let mut contrast = None;
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--index" => {
                i += 1;
                options.index = Some(args.get(i).ok_or("--index needs a value")?.parse()?);
            }
            "--seconds" => {
                i += 1;
                seconds = args.get(i).ok_or("--seconds needs a value")?.parse()?;
            }
            "--brightness" => {
                i += 1;
                brightness = Some(args.get(i).ok_or("--brightness needs a value")?.parse::<f64>()?);
            }
            "--contrast" => {
                i += 1;
                contrast = Some(args.get(i).ok_or("--contrast needs a value")?.parse::<f64>()?);
            }
            "--json" => json = true,
            other => {
                eprintln!("Ignoring unknown argument: {}", other);
            }
        }
        i += 1;
    }

    if let Some(value) = brightness {
        bridge.set_control(CameraControl::Brightness, value)?;
    }
    if let Some(value) = contrast {
        bridge.set_control(CameraControl::Contrast, value)?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut events = bridge.subscribe();
    let surface_id = bridge.start_preview(options).await?;
    println!("Preview running on surface {} (Ctrl-C to stop)", surface_id);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
    while running.load(Ordering::SeqCst) && tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
            Ok(Ok(event)) => {
                if json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    println!("Event: {:?}", event.kind);
                }
            }
            Ok(Err(_)) | Err(_) => {}
        }
    }

    bridge.close_device();
    println!("Preview closed");
    Ok(())
}

async fn cmd_call(bridge: &CameraBridge, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    // Parse args: call <method> [json-arguments]
    let method = args.get(2).ok_or("method required")?;
    let arguments = match args.get(3) {
        Some(raw) => serde_json::from_str(raw)?,
        None => serde_json::Value::Null,
    };

    let response = dispatch(bridge, MethodCall::new(method.clone(), arguments)).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    bridge.close_device();
    Ok(())
}
