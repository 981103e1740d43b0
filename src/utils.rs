use rand as rnd;
use rnd::rngs::StdRng;
use rnd::{Rng, SeedableRng};
use std::cell::RefCell;

use crate::prelude::*;

thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
}

/// Reseeds the generator behind [`rand`], [`rand_int`] and [`rand_bit`].
pub fn seed(seed: u64) {
    RNG.with(|r| *r.borrow_mut() = StdRng::seed_from_u64(seed));
}

pub async fn clock_cycles(signal: SimObject, n_cycles: u32) -> TbResult {
    for _ in 0..n_cycles {
        signal.rising_edge().await?;
    }
    Ok(Val::None)
}

#[inline]
pub fn rand() -> f32 {
    RNG.with(|r| r.borrow_mut().gen::<f32>())
}

/// Uniform in `0..ceil`, always 0 for `ceil == 0`.
#[inline]
pub fn rand_int(ceil: u32) -> u32 {
    if ceil == 0 {
        return 0;
    }
    RNG.with(|r| r.borrow_mut().gen_range(0..ceil))
}

#[inline]
pub fn rand_bit() -> Logic {
    RNG.with(|r| Logic::from(r.borrow_mut().gen::<bool>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        seed(7);
        let a: Vec<u32> = (0..32).map(|_| rand_int(2)).collect();
        seed(7);
        let b: Vec<u32> = (0..32).map(|_| rand_int(2)).collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|&v| v < 2));
    }

    #[test]
    fn empty_range_gives_zero() {
        seed(1);
        assert_eq!(rand_int(0), 0);
        assert_eq!(rand_int(1), 0);
    }

    #[test]
    fn bits_are_resolved() {
        seed(3);
        assert!((0..64).map(|_| rand_bit()).all(|b| b.is_resolved()));
        let f = rand();
        assert!((0.0..1.0).contains(&f));
    }
}
