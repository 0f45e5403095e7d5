use clap::Parser;
use std::{
    cell::RefCell,
    collections::VecDeque,
    convert::Infallible,
    error::Error,
    rc::Rc,
    sync::Arc,
    time::Duration,
};
use tokio::{sync::Mutex, task::LocalSet, time};
use tuyacover::{
    Frame, HEADER_LEN, QUERY_FRAME, DatapointType, datapoint,
    covering::{Calibration, CoveringConfig, CurtainMotor, FlagStore},
    embedded_io_async::{ErrorType, Write},
    encode_position,
    keepalive::KeepAlive,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Initial device-side position of the simulated motor
    #[arg(short, long, default_value_t = 50)]
    position: u8,

    /// Simulate a mirror-mounted motor
    #[arg(short, long)]
    reverse: bool,

    /// Logical target positions to request after calibration
    #[arg(short, long, value_delimiter = ',', default_value = "25,80,0")]
    targets: Vec<u8>,
}

/// Loopback port collecting everything the engine sends.
#[derive(Clone, Default)]
struct SharedPort(Rc<RefCell<VecDeque<u8>>>);

impl SharedPort {
    fn drain(&self) -> Vec<u8> {
        self.0.borrow_mut().drain(..).collect()
    }
}

impl ErrorType for SharedPort {
    type Error = Infallible;
}

impl Write for SharedPort {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        self.0.borrow_mut().extend(buf.iter().copied());

        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStore(Option<bool>);

#[async_trait::async_trait(?Send)]
impl FlagStore for MemoryStore {
    async fn load(&mut self, _key: &str) -> Option<bool> {
        self.0
    }

    async fn save(&mut self, _key: &str, value: bool) {
        self.0 = Some(value);
    }
}

/// Scripted motor: executes moves instantly and confirms with a report.
struct MotorModel {
    position: u8,
}

impl MotorModel {
    fn apply(&mut self, frame: &Frame<'_>) -> Option<Vec<u8>> {
        match (frame.datapoint, DatapointType::from_repr(frame.datapoint_type)?) {
            (datapoint::CONTROL, DatapointType::Enum) => {
                self.position = match frame.payload.first()? {
                    0x00 => 100,
                    0x02 => 0,
                    _ => self.position,
                };

                Some(report_frame(self.position))
            }
            (datapoint::POSITION, DatapointType::Value) => {
                self.position = frame.position().ok()?;

                Some(report_frame(self.position))
            }
            _ => None,
        }
    }
}

fn report_frame(position: u8) -> Vec<u8> {
    let mut data = vec![
        0x00,
        0x00,
        datapoint::POSITION_REPORT,
        DatapointType::Value as u8,
        0x00,
        0x04,
    ];

    data.extend_from_slice(&encode_position(position));

    data
}

type Motor = Arc<Mutex<CurtainMotor<SharedPort, MemoryStore>>>;

/// Feeds everything the engine sent through the motor model and delivers
/// the synthesized reports back to the engine.
async fn pump(motor: &Motor, port: &SharedPort, model: &mut MotorModel) -> Result<(), Box<dyn Error>> {
    let data = port.drain();
    let mut offset = 0;

    while data.len() >= offset + QUERY_FRAME.len() {
        // The report query is a bare 4-byte poll, not a datapoint frame.
        if data[offset + 2] == 0x00 {
            offset += QUERY_FRAME.len();
            continue;
        }

        let frame = Frame::decode(&data[offset..])?;
        let consumed = HEADER_LEN + frame.payload.len();

        if let Some(reply) = model.apply(&frame) {
            motor.lock().await.handle_frame(&reply).await?;
        }

        offset += consumed;
    }

    Ok(())
}

async fn print_state(motor: &Motor) {
    let guard = motor.lock().await;
    let state = guard.state();

    println!(
        "position={:?} closed={:?} motion={} calibration={:?}",
        state.position,
        state.is_closed(),
        state.motion,
        state.calibration,
    );
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let port = SharedPort::default();
    let config = CoveringConfig {
        reverse_direction: args.reverse,
        ..CoveringConfig::default()
    };
    let motor: Motor = Arc::new(Mutex::new(CurtainMotor::new(
        port.clone(),
        MemoryStore::default(),
        config,
    )));
    let mut model = MotorModel {
        position: args.position,
    };

    motor.lock().await.activate().await?;

    println!("Activated with motor at device position {}", args.position);
    print_state(&motor).await;

    while matches!(
        motor.lock().await.state().calibration,
        Calibration::InProgress { .. }
    ) {
        pump(&motor, &port, &mut model).await?;
        print_state(&motor).await;
    }

    for target in args.targets {
        println!("Requesting position {target}");

        motor.lock().await.set_position(target).await?;
        pump(&motor, &port, &mut model).await?;
        print_state(&motor).await;
    }

    let keep_alive = KeepAlive::start(Arc::clone(&motor), Duration::from_millis(100));

    time::sleep(Duration::from_millis(350)).await;
    drop(keep_alive);

    let queries = port.drain().len() / QUERY_FRAME.len();

    println!("Keep-alive queries sent while idle: {queries}");

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();

    LocalSet::new().run_until(run(args)).await
}
