pub mod link;
pub mod protocol;

pub use link::{open_link, SerialLink};
pub use protocol::*;

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, trace, warn};

use crate::error::PortError;
use crate::ring_buffer::TelemetryBuffer;

//a telemetry line longer than this without a newline is garbage
pub const MAX_LINE_LEN: usize = 256;

/// Where the control core sends commands
pub trait CommandSink{
    fn send(&self, command: MotorCommand) -> Result<(), PortError>;
    fn is_connected(&self) -> bool;
}

struct WriteJob{
    command: MotorCommand,
    reply: Sender<Result<(), PortError>>,
}

//threads and handles of one open port
struct Connection{
    jobs: Sender<WriteJob>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    running: Arc<AtomicBool>,
    link_alive: Arc<AtomicBool>,
}

/// Line-oriented command writer plus telemetry reader over one serial link.
///
/// Writes go through a single worker thread that waits `settle_delay` after
/// every command, so concurrent callers queue instead of interleaving.
/// The reader stops cooperatively: the stop flag is checked once per poll,
/// so shutdown can lag by one poll interval or one read timeout.
pub struct SerialTransport{
    buffer: Arc<TelemetryBuffer>,
    connection: Mutex<Option<Connection>>,
    dropped_lines: Arc<AtomicU64>,
    settle_delay: Duration,
    poll_interval: Duration,
}

impl SerialTransport{
    pub fn new(buffer: Arc<TelemetryBuffer>, settle_delay: Duration, poll_interval: Duration) -> Self{
        SerialTransport{
            buffer,
            connection: Mutex::new(None),
            dropped_lines: Arc::new(AtomicU64::new(0)),
            settle_delay,
            poll_interval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>>{
        self.connection.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn open(&self, port_name: &str, baud_rate: u32) -> Result<(), PortError>{
        info!("opening {} at {} baud", port_name, baud_rate);
        let link = open_link(port_name, baud_rate, self.poll_interval)?;
        self.connect(link)
    }

    /// Start the reader and writer threads on an already open link
    pub fn connect(&self, link: Box<dyn SerialLink>) -> Result<(), PortError>{
        if self.lock().is_some(){
            warn!("already connected, closing the previous link first");
            if let Err(e) = self.disconnect(){
                warn!("previous link did not close cleanly: {}", e);
            }
        }

        let write_link = link.try_clone_link().map_err(PortError::Clone)?;

        let running = Arc::new(AtomicBool::new(true));
        let link_alive = Arc::new(AtomicBool::new(true));
        let (jobs, job_rx) = crossbeam_channel::unbounded();

        let settle = self.settle_delay;
        let writer = thread::Builder::new()
            .name("motor-writer".into())
            .spawn(move || writer_loop(write_link, job_rx, settle))
            .map_err(PortError::Thread)?;

        let reader_ctx = ReaderContext{
            buffer: Arc::clone(&self.buffer),
            running: Arc::clone(&running),
            link_alive: Arc::clone(&link_alive),
            dropped_lines: Arc::clone(&self.dropped_lines),
            poll_interval: self.poll_interval,
        };
        let reader = match thread::Builder::new()
            .name("motor-reader".into())
            .spawn(move || reader_ctx.run(link))
        {
            Ok(handle) => handle,
            Err(e) =>{
                drop(jobs);
                let _ = writer.join();
                return Err(PortError::Thread(e));
            }
        };

        *self.lock() = Some(Connection{ jobs, writer, reader, running, link_alive });
        info!("serial link connected");
        Ok(())
    }

    /// Queue a command and wait until it is on the wire.
    /// Blocks for the settle delay of any command still ahead in the queue.
    pub fn write(&self, command: MotorCommand) -> Result<(), PortError>{
        let jobs = match self.lock().as_ref(){
            Some(conn) => conn.jobs.clone(),
            None => return Err(PortError::NotConnected),
        };
        submit(&jobs, command)
    }

    /// Stop the motor, stop streaming, stop the reader and close the port.
    ///
    /// Every step runs even if an earlier one failed; the first failure is returned.
    pub fn disconnect(&self) -> Result<(), PortError>{
        let conn = match self.lock().take(){
            Some(conn) => conn,
            None => return Ok(()),
        };

        let mut first_err = None;
        for command in [MotorCommand::SetSpeed(0), MotorCommand::SetStreaming(false)]{
            if let Err(e) = submit(&conn.jobs, command){
                warn!("teardown command {} failed: {}", command, e);
                first_err.get_or_insert(e);
            }
        }

        //writer drains the queue and sleeps out the last settle delay
        let Connection{ jobs, writer, reader, running, .. } = conn;
        drop(jobs);
        if writer.join().is_err(){
            warn!("writer thread panicked");
        }

        running.store(false, Ordering::SeqCst);
        if reader.join().is_err(){
            warn!("reader thread panicked");
        }

        info!("serial link closed");
        match first_err{
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_connected(&self) -> bool{
        self.lock()
            .as_ref()
            .map(|conn| conn.link_alive.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    //count of telemetry lines that failed to parse
    pub fn dropped_lines(&self) -> u64{
        self.dropped_lines.load(Ordering::Relaxed)
    }

    pub fn buffer(&self) -> Arc<TelemetryBuffer>{
        Arc::clone(&self.buffer)
    }
}

impl CommandSink for SerialTransport{
    fn send(&self, command: MotorCommand) -> Result<(), PortError>{
        self.write(command)
    }

    fn is_connected(&self) -> bool{
        SerialTransport::is_connected(self)
    }
}

impl Drop for SerialTransport{
    fn drop(&mut self){
        if self.lock().is_some(){
            if let Err(e) = self.disconnect(){
                warn!("disconnect on drop failed: {}", e);
            }
        }
    }
}

fn submit(jobs: &Sender<WriteJob>, command: MotorCommand) -> Result<(), PortError>{
    let (reply, reply_rx) = crossbeam_channel::bounded(1);
    jobs.send(WriteJob{ command, reply }).map_err(|_| PortError::WriterStopped)?;
    reply_rx.recv().map_err(|_| PortError::WriterStopped)?
}

fn writer_loop(mut link: Box<dyn SerialLink>, jobs: Receiver<WriteJob>, settle: Duration){
    for job in jobs.iter(){
        let line = job.command.encode();
        let result = link.write_all(line.as_bytes())
            .and_then(|_| link.flush())
            .map_err(PortError::Write);

        match &result{
            Ok(()) => debug!("tx {}", job.command),
            Err(e) => warn!("tx {} failed: {}", job.command, e),
        }
        let _ = job.reply.send(result);

        //device needs this long to digest a command
        thread::sleep(settle);
    }
}

struct ReaderContext{
    buffer: Arc<TelemetryBuffer>,
    running: Arc<AtomicBool>,
    link_alive: Arc<AtomicBool>,
    dropped_lines: Arc<AtomicU64>,
    poll_interval: Duration,
}

impl ReaderContext{
    fn run(self, mut link: Box<dyn SerialLink>){
        let mut pending: Vec<u8> = Vec::with_capacity(MAX_LINE_LEN);
        let mut read_buf = [0u8; 256];

        while self.running.load(Ordering::SeqCst){
            match link.bytes_available(){
                Ok(0) =>{
                    thread::sleep(self.poll_interval);
                    continue;
                }
                Ok(_) => {}
                Err(e) =>{
                    warn!("serial link lost: {}", e);
                    break;
                }
            }

            match link.read(&mut read_buf){
                Ok(n) if n > 0 =>{
                    pending.extend_from_slice(&read_buf[..n]);
                    let (pushed, dropped) = drain_lines(&mut pending, &self.buffer, Instant::now());
                    if dropped > 0{
                        self.dropped_lines.fetch_add(dropped, Ordering::Relaxed);
                    }
                    trace!("rx {} samples, {} dropped", pushed, dropped);
                }
                Ok(_) => {}
                Err(ref e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) =>{
                    warn!("serial read failed: {}", e);
                    break;
                }
            }
        }

        self.link_alive.store(false, Ordering::SeqCst);
        debug!("reader stopped");
    }
}

/// Parse every complete line in `pending` into the buffer.
/// Returns (pushed, dropped). A trailing partial line stays in `pending`.
pub fn drain_lines(pending: &mut Vec<u8>, buffer: &TelemetryBuffer, received_at: Instant) -> (u64, u64){
    let mut pushed = 0;
    let mut dropped = 0;

    while let Some(pos) = pending.iter().position(|&b| b == b'\n'){
        let raw: Vec<u8> = pending.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw[..pos]);

        match parse_telemetry_line(&line, received_at){
            Ok(sample) =>{
                buffer.push(sample);
                pushed += 1;
            }
            Err(e) =>{
                trace!("dropping line {:?}: {}", line, e);
                dropped += 1;
            }
        }
    }

    if pending.len() > MAX_LINE_LEN{
        pending.clear();
        dropped += 1;
    }

    (pushed, dropped)
}

#[cfg(test)]
mod tests{
    use super::*;
    use super::link::mock::MockLink;

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool{
        let start = Instant::now();
        while start.elapsed() < timeout{
            if cond(){
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    fn transport() -> SerialTransport{
        SerialTransport::new(
            Arc::new(TelemetryBuffer::default()),
            Duration::from_millis(1),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn test_drain_lines_keeps_partial(){
        let buffer = TelemetryBuffer::default();
        let mut pending = b"1,100,0.5\n0,20".to_vec();

        let (pushed, dropped) = drain_lines(&mut pending, &buffer, Instant::now());
        assert_eq!((pushed, dropped), (1, 0));
        assert_eq!(pending, b"0,20".to_vec());

        pending.extend_from_slice(b"0,0.1\n");
        drain_lines(&mut pending, &buffer, Instant::now());
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.latest().unwrap().direction, Direction::Reverse);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_drain_lines_drops_malformed(){
        let buffer = TelemetryBuffer::default();
        let mut pending = b"a,b\n1,2,x\n\n1,300,0.2\r\n".to_vec();

        let (pushed, dropped) = drain_lines(&mut pending, &buffer, Instant::now());
        assert_eq!((pushed, dropped), (1, 3));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.latest().unwrap().speed_rpm, 300.0);
    }

    #[test]
    fn test_drain_lines_discards_runaway_line(){
        let buffer = TelemetryBuffer::default();
        let mut pending = vec![b'7'; MAX_LINE_LEN + 1];

        let (_, dropped) = drain_lines(&mut pending, &buffer, Instant::now());
        assert_eq!(dropped, 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_write_requires_connection(){
        let t = transport();
        assert!(!t.is_connected());
        assert!(matches!(t.write(MotorCommand::Reset), Err(PortError::NotConnected)));
    }

    #[test]
    fn test_reader_fills_buffer(){
        let t = transport();
        let link = MockLink::new();
        t.connect(Box::new(link.clone())).unwrap();
        assert!(t.is_connected());

        link.feed("1,1200,0.3\nbad line\n1,1250,0.31\n");
        let buffer = t.buffer();
        assert!(wait_until(Duration::from_secs(2), || buffer.len() == 2));
        assert_eq!(buffer.latest().unwrap().speed_rpm, 1250.0);
        assert!(wait_until(Duration::from_secs(2), || t.dropped_lines() == 1));

        t.disconnect().unwrap();
    }

    #[test]
    fn test_writes_are_serialized_in_order(){
        let t = Arc::new(transport());
        let link = MockLink::new();
        t.connect(Box::new(link.clone())).unwrap();

        let handles: Vec<_> = (0..4u8).map(|i|{
            let t = Arc::clone(&t);
            thread::spawn(move || t.write(MotorCommand::SetSpeed(i * 10)))
        }).collect();
        for h in handles{
            h.join().unwrap().unwrap();
        }

        //every line intact, none interleaved
        let lines = link.written_lines();
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.starts_with("s,")));

        t.disconnect().unwrap();
    }

    #[test]
    fn test_settle_delay_spaces_writes(){
        let t = SerialTransport::new(
            Arc::new(TelemetryBuffer::default()),
            Duration::from_millis(40),
            Duration::from_millis(1),
        );
        let link = MockLink::new();
        t.connect(Box::new(link.clone())).unwrap();

        let start = Instant::now();
        t.write(MotorCommand::SetSpeed(1)).unwrap();
        t.write(MotorCommand::SetSpeed(2)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));

        t.disconnect().unwrap();
    }

    #[test]
    fn test_disconnect_sequence(){
        let t = transport();
        let link = MockLink::new();
        t.connect(Box::new(link.clone())).unwrap();
        t.write(MotorCommand::SetStreaming(true)).unwrap();

        t.disconnect().unwrap();
        assert!(!t.is_connected());
        assert_eq!(link.written_lines(), vec!["a,1", "s,0", "a,0"]);

        //second disconnect is a no-op
        t.disconnect().unwrap();
    }

    #[test]
    fn test_disconnect_continues_after_write_failure(){
        let t = transport();
        let link = MockLink::new();
        t.connect(Box::new(link.clone())).unwrap();
        link.set_fail_writes(true);

        assert!(matches!(t.disconnect(), Err(PortError::Write(_))));
        assert!(!t.is_connected());
        assert!(matches!(t.write(MotorCommand::Reset), Err(PortError::NotConnected)));
    }
}
