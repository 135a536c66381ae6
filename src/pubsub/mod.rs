pub mod message;
pub mod slot;
pub mod topic;
pub mod publisher;
pub mod subscriber;
pub mod registry;

pub use message::Message;
pub use slot::LatestSlot;
pub use topic::Topic;
pub use publisher::Publisher;
pub use subscriber::Subscriber;
pub use registry::TopicRegistry;

#[cfg(test)]
mod tests{
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_pubsub_threaded_latest_value(){
        let registry = TopicRegistry::new();
        let topic: Arc<Topic<u32>> = registry.get_or_create("cam/frame_index");

        let publisher = Publisher::new(Arc::clone(&topic));
        let subscriber = Subscriber::new(Arc::clone(&topic));

        let done = Arc::new(AtomicBool::new(false));
        let done_flag = Arc::clone(&done);

        let num_items = 1000;

        let producer = thread::spawn(move ||{
            for i in 1..=num_items{
                publisher.publish(i);
            }
            done_flag.store(true, Ordering::SeqCst);
        });

        //consumer samples whatever is freshest, values never go backwards
        let mut last = 0;
        loop{
            if let Some(val) = subscriber.take_latest(){
                assert!(val >= last);
                last = val;
            }
            if done.load(Ordering::SeqCst) && !subscriber.has_new(){
                break;
            }
            std::hint::spin_loop();
        }

        producer.join().unwrap();
        assert_eq!(subscriber.take_latest(), Some(num_items));
        assert_eq!(topic.latest_epoch(), num_items as u64);
    }
}
