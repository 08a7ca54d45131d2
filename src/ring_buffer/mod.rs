pub mod telemetry;

pub use telemetry::TelemetryBuffer;

//a slot in the ring buffer containing data and the epoch it was written at
struct Slot<T>{
    data: T,
    epoch: u64,
}

//fixed capacity ring, overwrites the oldest item when full (freshness bias)
//backing storage is allocated once, head is the next write index
pub struct RingBuffer<T>{
    buffer: Vec<Option<Slot<T>>>,
    head: usize,
    len: usize,
    write_epoch: u64, //inc on every push
    capacity: usize,
}

impl<T: Clone> RingBuffer<T>{
    pub fn new(capacity: usize) -> Self{
        assert!(capacity > 0, "ring buffer capacity must be greater than 0");

        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, || None);

        RingBuffer{
            buffer,
            head: 0,
            len: 0,
            write_epoch: 0,
            capacity,
        }
    }

    //index of the oldest slot
    fn tail(&self) -> usize{
        (self.head + self.capacity - self.len) % self.capacity
    }

    fn slot(&self, idx: usize) -> Option<&Slot<T>>{
        self.buffer[idx].as_ref()
    }

    //push item, discarding the oldest if full
    //returns the epoch of the push
    pub fn push(&mut self, item: T) -> u64{
        self.write_epoch += 1;

        self.buffer[self.head] = Some(Slot{ data: item, epoch: self.write_epoch });

        self.head = (self.head + 1) % self.capacity;
        if self.len < self.capacity{
            self.len += 1;
        }

        self.write_epoch
    }

    //pop the oldest item
    pub fn pop(&mut self) -> Option<T>{
        if self.len == 0{
            return None;
        }

        let tail = self.tail();
        self.len -= 1;
        self.buffer[tail].take().map(|slot| slot.data)
    }

    //latest item without removing
    pub fn peek_latest(&self) -> Option<(T, u64)>{
        if self.len == 0{
            return None;
        }

        let latest_idx = (self.head + self.capacity - 1) % self.capacity;
        self.slot(latest_idx).map(|slot| (slot.data.clone(), slot.epoch))
    }

    //oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_{
        let tail = self.tail();
        (0..self.len).filter_map(move |i| self.slot((tail + i) % self.capacity).map(|slot| &slot.data))
    }

    pub fn to_vec(&self) -> Vec<T>{
        self.iter().cloned().collect()
    }

    pub fn clear(&mut self){
        self.buffer.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
    }

    //epoch of the newest push, 0 before the first
    pub fn latest_epoch(&self) -> u64{
        self.write_epoch
    }

    pub fn len(&self) -> usize{
        self.len
    }

    pub fn is_empty(&self) -> bool{
        self.len == 0
    }

    pub fn is_full(&self) -> bool{
        self.len == self.capacity
    }

    pub fn capacity(&self) -> usize{
        self.capacity
    }
}

#[cfg(test)]
mod tests{
    use super::*;

    #[test]
    fn test_push_pop_fifo(){
        let mut rb: RingBuffer<i32> = RingBuffer::new(5);

        rb.push(10);
        rb.push(20);
        rb.push(30);

        assert_eq!(rb.pop(), Some(10));
        assert_eq!(rb.pop(), Some(20));
        assert_eq!(rb.pop(), Some(30));
        assert_eq!(rb.pop(), None);
    }

    #[test]
    fn test_wraparound(){
        let mut rb: RingBuffer<i32> = RingBuffer::new(3);

        rb.push(1);
        rb.push(2);
        rb.push(3);

        assert_eq!(rb.pop(), Some(1));

        rb.push(4); //writes at index 0

        assert_eq!(rb.to_vec(), vec![2, 3, 4]);
        assert_eq!(rb.pop(), Some(2));
        assert_eq!(rb.pop(), Some(3));
        assert_eq!(rb.pop(), Some(4));
        assert_eq!(rb.pop(), None);
    }

    #[test]
    fn test_overflow_discards_old(){
        let mut rb: RingBuffer<i32> = RingBuffer::new(3);

        rb.push(1);
        rb.push(2);
        rb.push(3);
        assert!(rb.is_full());

        rb.push(4); //1 is gone

        assert_eq!(rb.len(), 3);
        assert_eq!(rb.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn test_epoch_increment(){
        let mut rb: RingBuffer<i32> = RingBuffer::new(2);

        assert_eq!(rb.latest_epoch(), 0);
        assert_eq!(rb.push(10), 1);
        assert_eq!(rb.push(20), 2);
        assert_eq!(rb.push(30), 3); //overwrite still counts
        assert_eq!(rb.latest_epoch(), 3);
    }

    #[test]
    fn test_peek_latest(){
        let mut rb: RingBuffer<i32> = RingBuffer::new(5);
        assert!(rb.peek_latest().is_none());

        rb.push(10);
        rb.push(20);
        rb.push(30);

        //peek doesn't consume
        assert_eq!(rb.peek_latest(), Some((30, 3)));
        assert_eq!(rb.len(), 3);
    }

    #[test]
    fn test_clear(){
        let mut rb: RingBuffer<i32> = RingBuffer::new(3);
        rb.push(1);
        rb.push(2);
        rb.clear();

        assert!(rb.is_empty());
        assert!(rb.peek_latest().is_none());
        assert_eq!(rb.latest_epoch(), 2);
    }
}
