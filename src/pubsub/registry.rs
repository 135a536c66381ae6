use std::sync::{Arc, PoisonError, RwLock};
use std::collections::HashMap;
use std::any::Any;
use tracing::warn;
use super::topic::Topic;
use super::message::Message;

//one typed topic per name, shared by the producer thread and the drive loop
pub struct TopicRegistry{
    topics: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl TopicRegistry{
    pub fn new() -> Self{
        TopicRegistry{
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_create<T: Message>(&self, name: &str) -> Arc<Topic<T>>{
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = topics.get(name){
            match existing.clone().downcast::<Topic<T>>(){
                Ok(topic) => return topic,
                Err(_) => warn!(topic = name, "topic re-registered with a different type, replacing"),
            }
        }
        let topic = Arc::new(Topic::<T>::new(name));
        topics.insert(name.to_string(), topic.clone() as Arc<dyn Any + Send + Sync>);
        topic
    }

    pub fn topic_count(&self) -> usize{
        self.topics.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn topic_names(&self) -> Vec<String>{
        let mut names: Vec<String> = self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Default for TopicRegistry{
    fn default() -> Self{
        Self::new()
    }
}
