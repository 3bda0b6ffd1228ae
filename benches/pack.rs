#![feature(test)]
extern crate test;

use halo::array::ParArray4;
use halo::bvals::buffer::{pack, unpack};
use halo::index_space::{IndexBox, IndexRange, IndexShape};
use halo::kernel::ExecSpace;

const NX: usize = 64;
const NG: usize = 2;
const NUM_FIELDS: usize = 5;




/**
 * The ghost slab of the upper `i` face, as sent to a same-level neighbor.
 */
fn face_slab(shape: &IndexShape) -> IndexBox {
    let interior = shape.interior();
    let ie = interior.i.e;
    IndexBox::new(interior.k, interior.j, IndexRange::new(ie - NG as i64 + 1, ie))
}




// ============================================================================
#[bench]
fn pack_face_slab_serial(b: &mut test::Bencher) {
    let shape = IndexShape::new([NX, NX, NX], NG);
    let data = ParArray4::from_function(NUM_FIELDS, shape.entire_dims(), |v, k, j, i| (v as i64 + k + j + i) as f64);
    let region = face_slab(&shape);
    let mut buf = vec![0.0; NUM_FIELDS * region.len()];
    let exec = ExecSpace::serial();

    b.iter(|| pack(&exec, &data, &region, NUM_FIELDS, &mut buf));
}




// ============================================================================
#[bench]
fn pack_face_slab_parallel(b: &mut test::Bencher) {
    let shape = IndexShape::new([NX, NX, NX], NG);
    let data = ParArray4::from_function(NUM_FIELDS, shape.entire_dims(), |v, k, j, i| (v as i64 + k + j + i) as f64);
    let region = face_slab(&shape);
    let mut buf = vec![0.0; NUM_FIELDS * region.len()];
    let exec = ExecSpace::new(1);

    b.iter(|| pack(&exec, &data, &region, NUM_FIELDS, &mut buf));
}




// ============================================================================
#[bench]
fn unpack_face_slab_parallel(b: &mut test::Bencher) {
    let shape = IndexShape::new([NX, NX, NX], NG);
    let mut data = ParArray4::new(NUM_FIELDS, shape.entire_dims());
    let region = face_slab(&shape);
    let buf = vec![1.0; NUM_FIELDS * region.len()];
    let exec = ExecSpace::new(1);

    b.iter(|| unpack(&exec, &buf, &region, NUM_FIELDS, &mut data));
}
