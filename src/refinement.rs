use crate::array::ParArray4;
use crate::bvals::indices::{prolongation_region, restricted_region};
use crate::error::{Error, Result};
use crate::index_space::{Axis, IndexBox, IndexDomain, IndexRange, IndexShape};
use crate::kernel::ExecSpace;
use crate::mesh::{Mesh, MeshBlock, Partition};
use crate::neighbor::{LevelRelation, NeighborLevels};




/**
 * Map a coarse index along an axis to the first of the fine cells it
 * covers. Inactive axes map to themselves.
 */
fn first_child(fine: &IndexShape, coarse: &IndexShape, axis: Axis, c: i64) -> i64 {
    if fine.is_active(axis) {
        let fs = fine.bounds(axis, IndexDomain::Interior).s;
        let cs = coarse.bounds(axis, IndexDomain::Interior).s;
        fs + 2 * (c - cs)
    } else {
        c
    }
}


/**
 * Map a fine index along an axis to its coarse parent, and the offset of
 * the fine cell center from the parent's center in units of the coarse
 * cell width.
 */
fn parent(fine: &IndexShape, coarse: &IndexShape, axis: Axis, f: i64) -> (i64, f64) {
    if fine.is_active(axis) {
        let fs = fine.bounds(axis, IndexDomain::Interior).s;
        let cs = coarse.bounds(axis, IndexDomain::Interior).s;
        let d = f - fs;
        let side = if d.rem_euclid(2) == 0 { -0.25 } else { 0.25 };
        (cs + d.div_euclid(2), side)
    } else {
        (f, 0.0)
    }
}


fn minmod(a: f64, b: f64) -> f64 {
    if a * b <= 0.0 {
        0.0
    } else if a.abs() < b.abs() {
        a
    } else {
        b
    }
}




/**
 * Fill the cells of `region` in the coarse array with the average of the
 * fine cells each one covers: 2, 4 or 8 of them for 1, 2 or 3 active axes.
 * Cell volumes are uniform, so the average is a plain mean.
 */
pub fn restrict(
    exec: &ExecSpace,
    fine: &ParArray4,
    fine_shape: &IndexShape,
    coarse: &mut ParArray4,
    coarse_shape: &IndexShape,
    region: &IndexBox,
    nv: usize)
{
    if region.is_empty() {
        return;
    }
    let reach = |axis| if fine_shape.is_active(axis) { 2 } else { 1 };
    let (ri, rj, rk) = (reach(Axis::I), reach(Axis::J), reach(Axis::K));
    let weight = 1.0 / (ri * rj * rk) as f64;

    let rows = coarse.rows_mut(nv, region.k, region.j);

    exec.for_each_selected_row("restrict", rows, |(v, ck, cj), out| {
        let fk = first_child(fine_shape, coarse_shape, Axis::K, ck);
        let fj = first_child(fine_shape, coarse_shape, Axis::J, cj);

        for ci in region.i.iter() {
            let fi = first_child(fine_shape, coarse_shape, Axis::I, ci);
            let mut sum = 0.0;

            for dk in 0..rk {
                for dj in 0..rj {
                    for di in 0..ri {
                        sum += fine.get(v, fk + dk, fj + dj, fi + di);
                    }
                }
            }
            out[ci as usize] = sum * weight;
        }
    });
}


/**
 * Fill the fine cells covered by `region` of the coarse array, clipped to
 * the fine array, by linear interpolation with minmod-limited slopes.
 * `filled` is the part of the coarse array holding valid data; it must
 * reach one cell beyond `region` on every active axis except where the
 * domain ends, and there the slope is taken one-sided.
 */
pub fn prolongate(
    exec: &ExecSpace,
    coarse: &ParArray4,
    coarse_shape: &IndexShape,
    fine: &mut ParArray4,
    fine_shape: &IndexShape,
    region: &IndexBox,
    filled: &IndexBox,
    nv: usize)
{
    if region.is_empty() {
        return;
    }
    let children = |axis, r: IndexRange| {
        let entire = fine_shape.bounds(axis, IndexDomain::Entire);
        let s = first_child(fine_shape, coarse_shape, axis, r.s);
        let e = first_child(fine_shape, coarse_shape, axis, r.e) + if fine_shape.is_active(axis) { 1 } else { 0 };
        IndexRange::new(s.max(entire.s), e.min(entire.e))
    };
    let target = IndexBox::new(
        children(Axis::K, region.k),
        children(Axis::J, region.j),
        children(Axis::I, region.i));

    let active = [fine_shape.is_active(Axis::I), fine_shape.is_active(Axis::J), fine_shape.is_active(Axis::K)];
    let rows = fine.rows_mut(nv, target.k, target.j);

    exec.for_each_selected_row("prolongate", rows, |(v, fk, fj), out| {
        let (ck, sk) = parent(fine_shape, coarse_shape, Axis::K, fk);
        let (cj, sj) = parent(fine_shape, coarse_shape, Axis::J, fj);

        for fi in target.i.iter() {
            let (ci, si) = parent(fine_shape, coarse_shape, Axis::I, fi);
            let uc = coarse.get(v, ck, cj, ci);
            let slope = |dk: i64, dj: i64, di: i64| {
                let above = (ck + dk, cj + dj, ci + di);
                let below = (ck - dk, cj - dj, ci - di);
                let up = || coarse.get(v, above.0, above.1, above.2) - uc;
                let down = || uc - coarse.get(v, below.0, below.1, below.2);

                match (filled.contains(above), filled.contains(below)) {
                    (true, true) => minmod(up(), down()),
                    (true, false) => up(),
                    (false, true) => down(),
                    (false, false) => 0.0,
                }
            };
            let mut value = uc;

            if active[0] {
                value += si * slope(0, 0, 1);
            }
            if active[1] {
                value += sj * slope(0, 1, 0);
            }
            if active[2] {
                value += sk * slope(1, 0, 0);
            }
            out[fi as usize] = value;
        }
    });
}




/**
 * Fill the ghost zones a block shares with coarser neighbors. The data a
 * coarser neighbor sent sits in the coarse buffer; the coarse cells next
 * to it are restricted from the block's interior and from the ghost zones
 * of same-level neighbors, after which the ghost zone is prolongated from
 * the coarse buffer. Ghost zones from same-level neighbors must be set
 * first.
 */
pub fn prolongate_boundaries(mesh: &mut Mesh, part: &Partition) -> Result<()> {
    if !mesh.is_multilevel() {
        return Ok(());
    }
    let exec = mesh.exec.clone();

    for &lid in &part.lids {
        prolongate_block(&exec, &mut mesh.blocks[lid])?;
    }
    Ok(())
}


/**
 * The part of a coarse buffer that can hold data: all of it, except beyond
 * faces of the block where the domain ends.
 */
fn filled_region(cshape: &IndexShape, nblevel: &NeighborLevels) -> IndexBox {
    let range = |axis: Axis| {
        let entire = cshape.bounds(axis, IndexDomain::Entire);
        let interior = cshape.bounds(axis, IndexDomain::Interior);
        let face = |side: i32| {
            let mut ox = [0; 3];
            ox[axis.index()] = side;
            nblevel.get(ox).is_none()
        };
        if !cshape.is_active(axis) {
            return entire;
        }
        IndexRange::new(
            if face(-1) { interior.s } else { entire.s },
            if face(1) { interior.e } else { entire.e })
    };
    IndexBox::new(range(Axis::K), range(Axis::J), range(Axis::I))
}


fn prolongate_block(exec: &ExecSpace, block: &mut MeshBlock) -> Result<()> {
    let MeshBlock { gid, loc, cellbounds, c_cellbounds, neighbors, nblevel, data, .. } = block;
    let level = loc.level;
    let ng = cellbounds.nghost(Axis::I);
    let coarser: Vec<_> = neighbors
        .iter()
        .filter(|nb| nb.relation(level) == LevelRelation::Coarser)
        .map(|nb| nb.ni)
        .collect();

    if coarser.is_empty() {
        return Ok(());
    }
    let active = [true, cellbounds.is_active(Axis::J), cellbounds.is_active(Axis::K)];
    let filled = filled_region(c_cellbounds, nblevel);

    for var in data.vars.iter_mut().filter(|v| v.metadata.fill_ghost) {
        let nv = var.num_components();
        let label = &var.label;
        let fine = &mut var.data;
        let coarse = var
            .coarse
            .as_mut()
            .ok_or_else(|| Error::protocol(*gid, format!("field '{}' has no coarse buffer", label)))?;

        for ni in &coarser {
            let choices = |a: usize| -> Vec<i32> {
                match ni.ox[a] {
                    0 if active[a] => vec![-1, 0, 1],
                    0 => vec![0],
                    o => vec![0, o],
                }
            };
            for n2 in choices(2) {
                for n1 in choices(1) {
                    for n0 in choices(0) {
                        let n = [n0, n1, n2];

                        if nblevel.get(n) == Some(level) {
                            let region = restricted_region(c_cellbounds, ng, ni.ox, n);
                            restrict(exec, fine, cellbounds, coarse, c_cellbounds, &region, nv);
                        }
                    }
                }
            }
            let region = prolongation_region(cellbounds, c_cellbounds, ni, loc);
            prolongate(exec, coarse, c_cellbounds, fine, cellbounds, &region, &filled, nv);
        }
    }
    exec.fence();
    Ok(())
}
