//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::model::{Creator, Pinory};

/// `n` pinories on a 10-wide grid with ~20 m spacing around Seoul City Hall.
pub(crate) fn seoul_cluster(n: usize) -> Arc<Vec<Pinory>> {
    let pins = (0..n)
        .map(|i| {
            let dx = (i % 10) as f64 * 0.0002;
            let dy = (i / 10) as f64 * 0.0002;
            Pinory::new(format!("p{i}"), 126.978 + dx, 37.566 + dy)
        })
        .collect();
    Arc::new(pins)
}

/// A tight group of `users` own pinories and `friends` friend pinories.
pub(crate) fn mixed_cluster(users: usize, friends: usize) -> Arc<Vec<Pinory>> {
    let mut pins = Vec::new();
    for i in 0..users {
        pins.push(Pinory::new(format!("own-{i}"), 10.0 + i as f64 * 0.0001, 10.0));
    }
    for i in 0..friends {
        let creator = Creator::new(format!("friend-{i}")).with_avatar(format!("https://cdn.example/avatar-{i}.png"));
        pins.push(Pinory::friend(format!("fr-{i}"), 10.0, 10.0 + i as f64 * 0.0001, creator));
    }
    Arc::new(pins)
}
