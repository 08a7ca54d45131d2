use std::sync::{Mutex, MutexGuard};

use super::RingBuffer;
use crate::config::DEFAULT_BUFFER_CAPACITY;
use crate::uart::TelemetrySample;

//shared between the link reader (push) and the control tick / display (reads)
//one lock, held only for the copy in or out, never across I/O
pub struct TelemetryBuffer{
    inner: Mutex<RingBuffer<TelemetrySample>>,
}

impl TelemetryBuffer{
    pub fn new(capacity: usize) -> Self{
        TelemetryBuffer{
            inner: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    //push replaces a whole slot, a poisoned ring is still consistent
    fn lock(&self) -> MutexGuard<'_, RingBuffer<TelemetrySample>>{
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, sample: TelemetrySample) -> u64{
        self.lock().push(sample)
    }

    pub fn latest(&self) -> Option<TelemetrySample>{
        self.lock().peek_latest().map(|(sample, _)| sample)
    }

    //latest sample with its epoch so a display can tell if anything new arrived
    pub fn latest_with_epoch(&self) -> Option<(TelemetrySample, u64)>{
        self.lock().peek_latest()
    }

    //oldest first
    pub fn snapshot(&self) -> Vec<TelemetrySample>{
        self.lock().to_vec()
    }

    pub fn latest_epoch(&self) -> u64{
        self.lock().latest_epoch()
    }

    pub fn clear(&self){
        self.lock().clear();
    }

    pub fn len(&self) -> usize{
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool{
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize{
        self.lock().capacity()
    }
}

impl Default for TelemetryBuffer{
    fn default() -> Self{
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use crate::uart::Direction;
    use std::sync::Arc;
    use std::thread;

    fn sample(speed: f64) -> TelemetrySample{
        TelemetrySample::new(Direction::Forward, speed, 0.1)
    }

    #[test]
    fn test_keeps_last_hundred_in_order(){
        let buffer = TelemetryBuffer::default();
        for i in 0..150{
            buffer.push(sample(i as f64));
        }

        let snap = buffer.snapshot();
        assert_eq!(buffer.len(), 100);
        assert_eq!(snap.len(), 100);
        for (i, s) in snap.iter().enumerate(){
            assert_eq!(s.speed_rpm, (i + 50) as f64);
        }
        assert_eq!(buffer.latest().unwrap().speed_rpm, 149.0);
    }

    #[test]
    fn test_latest_with_epoch(){
        let buffer = TelemetryBuffer::new(4);
        assert!(buffer.latest_with_epoch().is_none());

        buffer.push(sample(1.0));
        buffer.push(sample(2.0));
        let (latest, epoch) = buffer.latest_with_epoch().unwrap();
        assert_eq!(latest.speed_rpm, 2.0);
        assert_eq!(epoch, 2);
        assert_eq!(buffer.latest_epoch(), 2);
    }

    #[test]
    fn test_concurrent_push_and_read(){
        let buffer = Arc::new(TelemetryBuffer::new(100));

        let writer_buf = Arc::clone(&buffer);
        let writer = thread::spawn(move ||{
            for i in 0..1000{
                writer_buf.push(sample(i as f64));
            }
        });

        let reader_buf = Arc::clone(&buffer);
        let reader = thread::spawn(move ||{
            for _ in 0..200{
                let snap = reader_buf.snapshot();
                assert!(snap.len() <= 100);
                //insertion order survives any interleaving
                for pair in snap.windows(2){
                    assert!(pair[1].speed_rpm > pair[0].speed_rpm);
                }
            }
        });

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.latest().unwrap().speed_rpm, 999.0);
    }
}
