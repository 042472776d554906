use rearm_once::Once;

static CONNECTED: Once = Once::new();

fn connect(fail: bool) -> Result<(), &'static str> {
   CONNECTED.call_fallible(|| {
      println!("Attempting connection (fail={fail})...");
      if fail {
         Err("Connection refused!")
      } else {
         Ok(())
      }
   })
}

fn main() {
   // First attempt fails
   match connect(true) {
      Ok(()) => panic!("Should have failed"),
      Err(e) => println!("Caught error: {e}"),
   }
   assert!(!CONNECTED.is_done()); // Still pending

   // Second attempt succeeds
   connect(false).expect("Should have succeeded");
   assert!(CONNECTED.is_done());

   // Subsequent attempts (even failing ones) are skipped
   connect(true).expect("Should have been skipped");
   println!("Connected once");
}
