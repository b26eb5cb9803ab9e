mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use dmxp_cbus::{cord_name, Cbus, CbusStat, Cmsg, CmsgHop, ConsumerPipe, Cord, Route};
use parking_lot::Mutex;
use tokio::sync::Notify;

use common::{quit_route, wait_until, Tracked};

/// Spawn a cord that joins `bus`, optionally caps its output, and runs
/// until a quit message arrives.
fn spawn_peer(name: &str, bus: &Cbus, quit: &Arc<Notify>, max_input: Option<usize>) -> Cord<()> {
    let bus = bus.clone();
    let quit = Arc::clone(quit);
    Cord::spawn(name, move || async move {
        let output = bus.join(ConsumerPipe::create());
        if let Some(max_input) = max_input {
            output.set_max_input(max_input);
        }
        quit.notified().await;
        bus.leave();
    })
    .unwrap()
}

#[test]
fn messages_arrive_in_push_order() {
    common::init_tracing();
    const N: u64 = 5000;

    let bus = Cbus::create();
    let quit = Arc::new(Notify::new());
    let seen = Arc::new(Mutex::new(Vec::with_capacity(N as usize)));
    let consumer = spawn_peer("consumer", &bus, &quit, None);

    let producer = {
        let bus = bus.clone();
        let quit = Arc::clone(&quit);
        let seen = Arc::clone(&seen);
        Cord::spawn("producer", move || async move {
            let output = bus.join(ConsumerPipe::create());
            output.set_max_input(7);
            let record = {
                let seen = Arc::clone(&seen);
                Route::new(vec![CmsgHop::new(
                    move |msg: &mut Cmsg| seen.lock().push(*msg.payload::<u64>().unwrap()),
                    None,
                )])
            };
            for seq in 0..N {
                // Mix plain pushes with explicit batches.
                if seq % 3 == 0 {
                    output.push_input(Cmsg::new(&record, seq));
                    output.flush_input();
                } else {
                    output.push(Cmsg::new(&record, seq));
                }
                if seq % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            wait_until("all messages", || seen.lock().len() == N as usize).await;
            output.push(Cmsg::new(&quit_route(quit), ()));
            bus.leave();
        })
        .unwrap()
    };

    producer.join().unwrap();
    consumer.join().unwrap();

    let seen = seen.lock();
    assert!(seen.iter().copied().eq(0..N), "messages were reordered");
    assert!(bus.stats().total(CbusStat::Locks as usize) > 0);
    assert!(bus.stats().total(CbusStat::Events as usize) > 0);
    println!("bus stats: {:?}", bus.stats());
    bus.destroy();
}

#[test]
fn multi_hop_routes_lose_nothing() {
    common::init_tracing();
    const N: usize = 2000;
    const MAX_HOPS: usize = 5;

    let mut rng = fastrand::Rng::with_seed(0xcb05);
    let cap_a = rng.usize(1..64);
    let cap_b = rng.usize(1..64);
    let lens: Vec<usize> = (0..N).map(|_| rng.usize(1..=MAX_HOPS)).collect();
    let expected_hops: usize = lens.iter().sum();
    println!("caps a={} b={}, {} hops in total", cap_a, cap_b, expected_hops);

    let bus = Cbus::create();
    let quit = Arc::new(Notify::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));
    let b = spawn_peer("b", &bus, &quit, Some(cap_b));

    let a = {
        let bus = bus.clone();
        let quit = Arc::clone(&quit);
        let hits = Arc::clone(&hits);
        let drops = Arc::clone(&drops);
        Cord::spawn("a", move || async move {
            let ab = bus.join(ConsumerPipe::create());
            ab.set_max_input(cap_a);
            let ba = ab.peer();

            // routes[len - 1] bounces a message len times: b, a, b, ...
            let routes: Vec<Route> = (1..=MAX_HOPS)
                .map(|len| {
                    Route::new(
                        (0..len)
                            .map(|k| {
                                let hits = Arc::clone(&hits);
                                let next = if k + 1 == len {
                                    None
                                } else if k % 2 == 0 {
                                    Some(ba.clone())
                                } else {
                                    Some(ab.clone())
                                };
                                CmsgHop::new(
                                    move |_: &mut Cmsg| {
                                        hits.fetch_add(1, Ordering::SeqCst);
                                    },
                                    next,
                                )
                            })
                            .collect(),
                    )
                })
                .collect();

            for (seq, len) in lens.iter().enumerate() {
                let payload = Tracked {
                    seq: seq as u64,
                    drops: Arc::clone(&drops),
                };
                ab.push(Cmsg::new(&routes[len - 1], payload));
                if seq % 64 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            wait_until("every route to end", || drops.load(Ordering::SeqCst) == N).await;
            ab.push(Cmsg::new(&quit_route(quit), ()));
            bus.leave();
        })
        .unwrap()
    };

    a.join().unwrap();
    b.join().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), N);
    assert_eq!(hits.load(Ordering::SeqCst), expected_hops);
    bus.destroy();
}

#[test]
fn reaching_max_input_flushes_immediately() {
    common::init_tracing();
    const CAP: usize = 4;

    let bus = Cbus::create();
    let quit = Arc::new(Notify::new());
    let handled = Arc::new(AtomicUsize::new(0));
    let (batch_done, batch_rx) = mpsc::sync_channel::<usize>(8);
    let consumer = spawn_peer("consumer", &bus, &quit, None);

    let producer = {
        let bus = bus.clone();
        let quit = Arc::clone(&quit);
        let handled = Arc::clone(&handled);
        Cord::spawn("producer", move || async move {
            let output = bus.join(ConsumerPipe::create());
            output.set_max_input(CAP);
            assert_eq!(output.max_input(), CAP);
            let route = {
                let handled = Arc::clone(&handled);
                Route::new(vec![CmsgHop::new(
                    move |_: &mut Cmsg| {
                        let n = handled.fetch_add(1, Ordering::SeqCst) + 1;
                        let _ = batch_done.try_send(n);
                    },
                    None,
                )])
            };

            for i in 1..CAP {
                output.push_input(Cmsg::new(&route, ()));
                assert_eq!(output.n_input(), i);
            }
            output.push_input(Cmsg::new(&route, ()));
            assert_eq!(output.n_input(), 0, "the cap must flush on the spot");

            // Block this cord's thread: only the on-the-spot flush can have
            // handed the batch to the consumer.
            let mut last = 0;
            while last < CAP {
                last = batch_rx.recv_timeout(Duration::from_secs(10)).unwrap();
            }

            // Below the cap nothing moves until the loop gets to run.
            for _ in 1..CAP {
                output.push_input(Cmsg::new(&route, ()));
            }
            assert!(batch_rx.recv_timeout(Duration::from_millis(100)).is_err());
            assert_eq!(output.n_input(), CAP - 1);
            assert_eq!(handled.load(Ordering::SeqCst), CAP);

            output.flush_input();
            wait_until("the deferred flush", || {
                handled.load(Ordering::SeqCst) == 2 * CAP - 1
            })
            .await;
            assert_eq!(output.n_input(), 0);

            output.push(Cmsg::new(&quit_route(quit), ()));
            bus.leave();
        })
        .unwrap()
    };

    producer.join().unwrap();
    consumer.join().unwrap();
    bus.destroy();
}

#[test]
fn route_ends_at_its_last_hop() {
    common::init_tracing();

    struct Trail {
        visited: Arc<Mutex<Vec<String>>>,
        freed_in: Arc<Mutex<Option<String>>>,
    }
    impl Drop for Trail {
        fn drop(&mut self) {
            *self.freed_in.lock() = Some(cord_name());
        }
    }

    fn visit(msg: &mut Cmsg) {
        let trail = msg.payload::<Trail>().unwrap();
        trail.visited.lock().push(format!("{}@{}", cord_name(), msg.hop()));
    }

    let bus = Cbus::create();
    let quit = Arc::new(Notify::new());
    let visited = Arc::new(Mutex::new(Vec::new()));
    let freed_in = Arc::new(Mutex::new(None));
    let b = spawn_peer("b", &bus, &quit, None);

    let a = {
        let bus = bus.clone();
        let quit = Arc::clone(&quit);
        let visited = Arc::clone(&visited);
        let freed_in = Arc::clone(&freed_in);
        Cord::spawn("a", move || async move {
            let ab = bus.join(ConsumerPipe::create());
            let ba = ab.peer();
            let route = Route::new(vec![
                CmsgHop::new(visit, Some(ba)),
                CmsgHop::new(visit, Some(ab.clone())),
                CmsgHop::new(visit, None),
            ]);
            ab.push(Cmsg::new(
                &route,
                Trail {
                    visited: Arc::clone(&visited),
                    freed_in: Arc::clone(&freed_in),
                },
            ));
            wait_until("the route to end", || freed_in.lock().is_some()).await;
            ab.push(Cmsg::new(&quit_route(quit), ()));
            bus.leave();
        })
        .unwrap()
    };

    a.join().unwrap();
    b.join().unwrap();
    assert_eq!(*visited.lock(), ["b@0", "a@1", "b@2"]);
    assert_eq!(freed_in.lock().as_deref(), Some("b"));
    bus.destroy();
}

#[test]
#[should_panic(expected = "must not push into the same pipe")]
fn consecutive_hops_into_one_pipe_are_rejected() {
    let bus = Cbus::create();
    let pipe = {
        let bus = bus.clone();
        let quit = Arc::new(Notify::new());
        let peer = spawn_peer("peer", &bus, &quit, None);
        let pipe = Cord::spawn("joiner", move || async move {
            let output = bus.join(ConsumerPipe::create());
            quit.notify_one();
            output
        })
        .unwrap()
        .join()
        .unwrap();
        peer.join().unwrap();
        pipe
    };
    Route::new(vec![
        CmsgHop::new(|_: &mut Cmsg| {}, Some(pipe.clone())),
        CmsgHop::new(|_: &mut Cmsg| {}, Some(pipe)),
        CmsgHop::new(|_: &mut Cmsg| {}, None),
    ]);
}

#[test]
fn own_flush_collects_messages_waiting_for_this_cord() {
    common::init_tracing();
    const K: usize = 5;

    let bus = Cbus::create();
    let quit = Arc::new(Notify::new());
    let go = Arc::new(Notify::new());
    let sent = Arc::new(Notify::new());
    let handled = Arc::new(AtomicUsize::new(0));

    let b = {
        let bus = bus.clone();
        let quit = Arc::clone(&quit);
        let go = Arc::clone(&go);
        let sent = Arc::clone(&sent);
        let handled = Arc::clone(&handled);
        Cord::spawn("b", move || async move {
            let output = bus.join(ConsumerPipe::create());
            output.set_max_input(K);
            let route = Route::new(vec![CmsgHop::new(
                move |_: &mut Cmsg| {
                    handled.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )]);
            go.notified().await;
            // The K-th message flushes on the spot.
            for _ in 0..K {
                output.push_input(Cmsg::new(&route, ()));
            }
            assert_eq!(output.n_input(), 0);
            sent.notify_one();
            quit.notified().await;
            bus.leave();
        })
        .unwrap()
    };

    let a = {
        let bus = bus.clone();
        let handled = Arc::clone(&handled);
        Cord::spawn("a", move || async move {
            let output = bus.join(ConsumerPipe::create());
            // Stop reacting to wake-ups: only our own flush can fetch now.
            bus.leave();
            go.notify_one();
            sent.notified().await;

            let input = bus.input();
            assert_eq!(input.shared_len(), K);
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(input.shared_len(), K);
            assert_eq!(handled.load(Ordering::SeqCst), 0);

            output.set_max_input(1);
            output.push_input(Cmsg::new(&quit_route(quit), ()));
            // The flush took the waiting batch along.
            assert_eq!(input.shared_len(), 0);
            wait_until("the fetched batch", || handled.load(Ordering::SeqCst) == K).await;
        })
        .unwrap()
    };

    a.join().unwrap();
    b.join().unwrap();
    assert_eq!(handled.load(Ordering::SeqCst), K);
    bus.destroy();
}

#[test]
fn fetch_pushes_out_input_staged_for_the_peer() {
    common::init_tracing();
    const K: usize = 6;

    let bus = Cbus::create();
    let quit = Arc::new(Notify::new());
    let go = Arc::new(Notify::new());
    let received = Arc::new(Notify::new());
    let handled_b = Arc::new(AtomicUsize::new(0));

    let b = {
        let bus = bus.clone();
        let quit = Arc::clone(&quit);
        let go = Arc::clone(&go);
        let received = Arc::clone(&received);
        let handled_b = Arc::clone(&handled_b);
        Cord::spawn("b", move || async move {
            let output = bus.join(ConsumerPipe::create());
            go.notified().await;
            let reply = Route::new(vec![CmsgHop::new(
                move |_: &mut Cmsg| received.notify_one(),
                None,
            )]);
            output.push(Cmsg::new(&reply, ()));
            wait_until("the staged batch", || handled_b.load(Ordering::SeqCst) == K).await;
            quit.notified().await;
            bus.leave();
        })
        .unwrap()
    };

    let a = {
        let bus = bus.clone();
        let handled_b = Arc::clone(&handled_b);
        Cord::spawn("a", move || async move {
            let output = bus.join(ConsumerPipe::create());
            let route = Route::new(vec![CmsgHop::new(
                move |_: &mut Cmsg| {
                    handled_b.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )]);
            // Staged and never flushed by this cord.
            for _ in 0..K {
                output.push_input(Cmsg::new(&route, ()));
            }
            assert_eq!(output.n_input(), K);
            go.notify_one();

            received.notified().await;
            // Fetching b's message moved the staged batch out too.
            assert_eq!(output.n_input(), 0);
            output.push(Cmsg::new(&quit_route(quit), ()));
            bus.leave();
        })
        .unwrap()
    };

    a.join().unwrap();
    b.join().unwrap();
    assert_eq!(handled_b.load(Ordering::SeqCst), K);
    bus.destroy();
}
