use std::sync::atomic::{AtomicUsize, Ordering};

use rearm_once::Once;
use tokio::time::{sleep, Duration};

static LOADS: AtomicUsize = AtomicUsize::new(0);
static CACHE_LOADED: Once = Once::new();

async fn load_cache() {
   LOADS.fetch_add(1, Ordering::Relaxed);
   println!("Loading cache...");
   sleep(Duration::from_millis(50)).await;
}

#[tokio::main]
async fn main() {
   let tasks: Vec<_> = (0..5)
      .map(|i| {
         tokio::spawn(async move {
            CACHE_LOADED.call_async(load_cache).await;
            println!("Task {i} sees a loaded cache");
         })
      })
      .collect();

   for t in tasks {
      t.await.unwrap();
   }
   assert_eq!(LOADS.load(Ordering::Relaxed), 1);

   // Refresh unconditionally, e.g. on a config change
   CACHE_LOADED.call_force_async(load_cache).await;
   CACHE_LOADED.call_async(load_cache).await;
   assert_eq!(LOADS.load(Ordering::Relaxed), 2);
   println!("Cache loaded {} times", LOADS.load(Ordering::Relaxed));
}
