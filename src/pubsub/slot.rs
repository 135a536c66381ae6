use std::sync::{PoisonError, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};

//single slot holding the most recent value and the epoch it was written at.
//writers take the slot exclusively, readers clone a snapshot and never wait on the producer loop
pub struct LatestSlot<T>{
    data: RwLock<Option<T>>,
    epoch: AtomicU64, //epoch of the value currently in the slot, 0 = never written
}

impl<T: Clone> LatestSlot<T>{
    pub fn new() -> Self{
        LatestSlot{
            data: RwLock::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    //overwrite the slot, returns the epoch of this write
    pub fn push(&self, item: T) -> u64{
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *data = Some(item);
        //bumped under the write lock so value and epoch always match
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn peek_latest(&self) -> Option<(T, u64)>{
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let item = data.as_ref()?.clone();
        Some((item, self.epoch.load(Ordering::Acquire)))
    }

    pub fn latest_epoch(&self) -> u64{
        self.epoch.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool{
        self.latest_epoch() == 0
    }
}

impl<T: Clone> Default for LatestSlot<T>{
    fn default() -> Self{
        Self::new()
    }
}

#[cfg(test)]
mod tests{
    use super::*;

    #[test]
    fn test_empty_slot(){
        let slot: LatestSlot<f32> = LatestSlot::new();
        assert!(slot.is_empty());
        assert_eq!(slot.latest_epoch(), 0);
        assert!(slot.peek_latest().is_none());
    }

    #[test]
    fn test_push_overwrites(){
        let slot = LatestSlot::new();
        assert_eq!(slot.push(0.1f32), 1);
        assert_eq!(slot.push(0.2f32), 2);
        assert_eq!(slot.push(0.3f32), 3);

        //only the newest value survives
        let (val, epoch) = slot.peek_latest().unwrap();
        assert_eq!(val, 0.3);
        assert_eq!(epoch, 3);
    }

    #[test]
    fn test_peek_does_not_consume(){
        let slot = LatestSlot::new();
        slot.push(String::from("user"));
        assert_eq!(slot.peek_latest().unwrap().0, "user");
        assert_eq!(slot.peek_latest().unwrap().0, "user");
        assert!(!slot.is_empty());
    }
}
