use criterion::{criterion_group, criterion_main, Criterion};
use ring_buffers::BoundedRing;
use std::sync::mpsc as std_mpsc;
use std::thread;

const COUNT: u32 = 4096;

fn contention_split(c: &mut Criterion) {
    c.bench_function("contention bounded split", |b| {
        b.iter(|| {
            let (mut tx, mut rx) = BoundedRing::with_capacity(1024).split();

            let t = thread::spawn(move || {
                let mut i = 0;
                while i < COUNT {
                    if tx.try_write(i).is_ok() {
                        i += 1;
                    } else {
                        std::hint::spin_loop();
                    }
                }
            });

            let mut received = 0;
            while received < COUNT {
                if rx.read().is_some() {
                    received += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
            t.join().unwrap();
        })
    });
}

fn contention_mpsc(c: &mut Criterion) {
    c.bench_function("contention std sync_channel", |b| {
        b.iter(|| {
            let (tx, rx) = std_mpsc::sync_channel(1024);

            let t = thread::spawn(move || {
                for i in 0..COUNT {
                    tx.send(i).unwrap();
                }
            });

            for _ in 0..COUNT {
                rx.recv().unwrap();
            }
            t.join().unwrap();
        })
    });
}

criterion_group!(contention, contention_split, contention_mpsc);
criterion_main!(contention);
