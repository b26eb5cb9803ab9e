// In demos/ping_pong.rs
use dmxp_cbus::{Cbus, CbusError, CbusStat, Cmsg, CmsgHop, ConsumerPipe, Cord, Route};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;

fn main() -> Result<(), CbusError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <num_messages> [max_input]", args[0]);
        std::process::exit(1);
    }
    let num_messages: usize = match args[1].parse() {
        Ok(n) => n,
        Err(_) => {
            eprintln!("Invalid number of messages: {}", args[1]);
            std::process::exit(1);
        }
    };
    let max_input: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(128).max(1);

    let bus = Cbus::create();
    let quit = Arc::new(Notify::new());

    let server = {
        let bus = bus.clone();
        let quit = Arc::clone(&quit);
        Cord::spawn("pong", move || async move {
            let output = bus.join(ConsumerPipe::create());
            output.set_max_input(max_input);
            quit.notified().await;
            bus.leave();
        })?
    };

    let client = {
        let bus = bus.clone();
        Cord::spawn("ping", move || async move {
            let output = bus.join(ConsumerPipe::create());
            output.set_max_input(max_input);

            let pongs = Arc::new(AtomicUsize::new(0));
            let done = Arc::new(Notify::new());
            let route = {
                let pongs = Arc::clone(&pongs);
                let done = Arc::clone(&done);
                Route::new(vec![
                    // ping: runs in the server, bounces the message back
                    CmsgHop::new(|_: &mut Cmsg| {}, Some(output.peer())),
                    // pong: runs here, frees the message
                    CmsgHop::new(
                        move |_: &mut Cmsg| {
                            if pongs.fetch_add(1, Ordering::Relaxed) + 1 == num_messages {
                                done.notify_one();
                            }
                        },
                        None,
                    ),
                ])
            };

            println!("Ping: sending {} messages (max_input = {})", num_messages, max_input);
            let start = Instant::now();
            for seq in 0..num_messages {
                output.push(Cmsg::new(&route, seq));
                if seq % 1024 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            if num_messages > 0 {
                done.notified().await;
            }
            let elapsed = start.elapsed();

            let server_name = bus.invoke(dmxp_cbus::cord_name).await?;
            println!(
                "Ping: {} round trips through '{}' in {:.2?} ({:.0} msg/s)",
                pongs.load(Ordering::Relaxed),
                server_name,
                elapsed,
                num_messages as f64 / elapsed.as_secs_f64()
            );

            output.push(Cmsg::new(
                &Route::new(vec![CmsgHop::new(move |_: &mut Cmsg| quit.notify_one(), None)]),
                (),
            ));
            bus.leave();
            Ok::<(), CbusError>(())
        })?
    };

    client.join()??;
    server.join()?;

    let stats = bus.stats();
    println!(
        "Bus: {} locks, {} wake-ups",
        stats.total(CbusStat::Locks as usize),
        stats.total(CbusStat::Events as usize)
    );
    bus.destroy();
    Ok(())
}
