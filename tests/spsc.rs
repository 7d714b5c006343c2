use ring_buffers::{BoundedRing, Consumer, Producer};
use std::thread;

fn seq_test(amt: u32, cap: usize) {
    let (tx, mut rx) = BoundedRing::with_capacity(cap).split();
    let t = thread::spawn(move || send_sequence(amt, tx));

    let mut n = 0;
    loop {
        match rx.read() {
            Some(i) => {
                assert_eq!(i, n);
                n += 1;
            }
            None if rx.is_closed() => match rx.read() {
                // the producer may have written right before closing
                Some(i) => {
                    assert_eq!(i, n);
                    n += 1;
                }
                None => break,
            },
            None => thread::yield_now(),
        }
    }

    assert_eq!(n, amt);
    t.join().unwrap();
}

fn send_sequence(n: u32, mut tx: Producer<u32>) {
    let mut x = 0;
    while x < n {
        match tx.try_write(x) {
            Ok(()) => x += 1,
            Err(err) if err.is_full() => thread::yield_now(),
            Err(err) => panic!("consumer went away: {}", err),
        }
    }
}

fn drain(rx: &mut Consumer<u32>) -> Vec<u32> {
    std::iter::from_fn(|| rx.read()).collect()
}

#[test]
#[cfg_attr(miri, ignore)]
fn spsc_test() {
    const COUNT: usize = 100;

    for _ in 0..COUNT {
        seq_test(10000, 2);
    }

    for _ in 0..COUNT {
        seq_test(10000, 100);
    }
}

#[test]
fn single_slot_handoff() {
    seq_test(500, 1);
}

#[test]
fn overflow_is_dropped_across_split() {
    let (mut tx, mut rx) = BoundedRing::with_capacity(3).split();
    for i in 0..10 {
        tx.write(i);
    }
    assert_eq!(drain(&mut rx), [0, 1, 2]);

    tx.write(10);
    assert_eq!(drain(&mut rx), [10]);
}
