//! Fused element-wise maps.
//!
//! `transform*` read one to three same-shaped operands and write `f` of the
//! aligned elements into `out`, resizing it to the operands' shape.
//! `apply`/`apply2` do the same in place, with the destination's current
//! value passed as the first argument. Nothing is allocated besides a possible resize of `out`.
//!
//! Large buffers are cut into blocks of [`BLOCK`] elements and spread over
//! workers; small ones run on the calling thread.

use super::{TensorFloat, TensorOps, TensorOpsMut};
use crate::error::{Error, Result};
use crate::parallel;

/// Elements handed to a worker at a time.
pub const BLOCK: usize = 4096;

type F = TensorFloat;

fn same_shape(op: &'static str, a: &[usize], b: &[usize]) -> Result<()> {
    if a == b {
        Ok(())
    } else {
        Err(Error::dimension(op, a, b))
    }
}

fn for_blocks<G>(out: &mut [F], g: G)
where
    G: Fn(usize, &mut [F]) + Sync,
{
    parallel::dynamic_parallel_for_chunks(BLOCK, out, BLOCK, |i, block| g(i * BLOCK, block), None, 0);
}

/// `out[i] = f(a[i])`
///
/// # Errors
///
/// [`Error::Dimension`] if `out` cannot take `a`'s shape.
pub fn transform<A, O>(a: &A, out: &mut O, f: impl Fn(F) -> F + Sync) -> Result<()>
where
    A: TensorOps + ?Sized,
    O: TensorOpsMut + ?Sized,
{
    out.resize_to(a.shape())?;
    let a = a.data();
    for_blocks(out.data_mut(), |off, block| {
        for (o, &x) in block.iter_mut().zip(&a[off..]) {
            *o = f(x);
        }
    });
    Ok(())
}

/// `out[i] = f(a[i], b[i])`
///
/// # Errors
///
/// [`Error::Dimension`] if `a` and `b` differ in shape.
pub fn transform2<A, B, O>(a: &A, b: &B, out: &mut O, f: impl Fn(F, F) -> F + Sync) -> Result<()>
where
    A: TensorOps + ?Sized,
    B: TensorOps + ?Sized,
    O: TensorOpsMut + ?Sized,
{
    same_shape("transform2", a.shape(), b.shape())?;
    out.resize_to(a.shape())?;
    let (a, b) = (a.data(), b.data());
    for_blocks(out.data_mut(), |off, block| {
        for ((o, &x), &y) in block.iter_mut().zip(&a[off..]).zip(&b[off..]) {
            *o = f(x, y);
        }
    });
    Ok(())
}

/// `out[i] = f(a[i], b[i], c[i])`
///
/// # Errors
///
/// [`Error::Dimension`] if the three operands differ in shape.
pub fn transform3<A, B, C, O>(
    a: &A,
    b: &B,
    c: &C,
    out: &mut O,
    f: impl Fn(F, F, F) -> F + Sync,
) -> Result<()>
where
    A: TensorOps + ?Sized,
    B: TensorOps + ?Sized,
    C: TensorOps + ?Sized,
    O: TensorOpsMut + ?Sized,
{
    same_shape("transform3", a.shape(), b.shape())?;
    same_shape("transform3", a.shape(), c.shape())?;
    out.resize_to(a.shape())?;
    let (a, b, c) = (a.data(), b.data(), c.data());
    for_blocks(out.data_mut(), |off, block| {
        for (((o, &x), &y), &z) in block
            .iter_mut()
            .zip(&a[off..])
            .zip(&b[off..])
            .zip(&c[off..])
        {
            *o = f(x, y, z);
        }
    });
    Ok(())
}

/// `out[i] = f(out[i])`
pub fn apply<O>(out: &mut O, f: impl Fn(F) -> F + Sync)
where
    O: TensorOpsMut + ?Sized,
{
    for_blocks(out.data_mut(), |_, block| {
        for o in block.iter_mut() {
            *o = f(*o);
        }
    });
}

/// `out[i] = f(out[i], a[i])`
///
/// # Errors
///
/// [`Error::Dimension`] if `out` and `a` differ in shape.
pub fn apply2<O, A>(out: &mut O, a: &A, f: impl Fn(F, F) -> F + Sync) -> Result<()>
where
    O: TensorOpsMut + ?Sized,
    A: TensorOps + ?Sized,
{
    same_shape("apply2", out.shape(), a.shape())?;
    let a = a.data();
    for_blocks(out.data_mut(), |off, block| {
        for (o, &x) in block.iter_mut().zip(&a[off..]) {
            *o = f(*o, x);
        }
    });
    Ok(())
}
