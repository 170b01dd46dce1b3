//! Near-square factorization of a patch count.

/// Factor `n` patches into a `(rows, cols)` grid with `rows * cols == n`.
///
/// `rows` is the largest divisor of `n` not above `sqrt(n)`, so a square
/// count gives a square grid and a prime count gives `(1, n)`.
/// Returns `None` for zero.
pub fn patch_grid(n: usize) -> Option<(usize, usize)> {
    if n == 0 {
        return None;
    }
    (1..=isqrt(n))
        .rev()
        .find(|rows| n % rows == 0)
        .map(|rows| (rows, n / rows))
}

fn isqrt(n: usize) -> usize {
    let mut r = (n as f64).sqrt() as usize;
    while r * r > n {
        r -= 1;
    }
    while (r + 1) * (r + 1) <= n {
        r += 1;
    }
    r
}
