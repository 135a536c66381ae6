use std::sync::Arc;
use super::slot::LatestSlot;
use super::message::Message;

//named latest-value topic, one producer, any number of readers
pub struct Topic<T: Message>{
    name: String,
    slot: Arc<LatestSlot<T>>,
}

impl<T: Message> Topic<T>{
    pub fn new(name: &str) -> Self{
        Topic{
            name: name.to_string(),
            slot: Arc::new(LatestSlot::new()),
        }
    }

    pub fn name(&self) -> &str{
        &self.name
    }

    pub fn publish(&self, msg: T) -> u64{
        self.slot.push(msg)
    }

    pub fn peek_latest(&self) -> Option<(T, u64)>{
        self.slot.peek_latest()
    }

    pub fn latest(&self) -> Option<T>{
        self.slot.peek_latest().map(|(msg, _)| msg)
    }

    pub fn latest_epoch(&self) -> u64{
        self.slot.latest_epoch()
    }

    pub fn is_empty(&self) -> bool{
        self.slot.is_empty()
    }
}

impl<T: Message> Clone for Topic<T>{
    fn clone(&self) -> Self{
        Topic{
            name: self.name.clone(),
            slot: Arc::clone(&self.slot),
        }
    }
}
