use std::sync::atomic::{AtomicUsize, Ordering};

use rearm_once::Once;

static COUNTER: AtomicUsize = AtomicUsize::new(0);
static WARMUP: Once = Once::new();

fn warm_up() {
   WARMUP.call(|| {
      // This closure runs only once until the gate is reset
      COUNTER.fetch_add(1, Ordering::Relaxed);
      println!("Warming up...");
      std::thread::sleep(std::time::Duration::from_millis(50));
   });
}

fn main() {
   let threads: Vec<_> = (0..5)
      .map(|i| {
         std::thread::spawn(move || {
            warm_up();
            println!("Thread {i} sees warm-up finished");
         })
      })
      .collect();

   for t in threads {
      t.join().unwrap();
   }
   assert_eq!(COUNTER.load(Ordering::Relaxed), 1);

   // Forcing runs again but keeps later ordinary calls skipped
   WARMUP.call_force(|| {
      COUNTER.fetch_add(1, Ordering::Relaxed);
      println!("Forced warm-up");
   });
   warm_up();
   assert_eq!(COUNTER.load(Ordering::Relaxed), 2);

   // After a reset the next call runs again
   WARMUP.reset();
   warm_up();
   assert_eq!(COUNTER.load(Ordering::Relaxed), 3);
   println!("Warm-up ran {} times", COUNTER.load(Ordering::Relaxed));
}
