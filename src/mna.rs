//! Stamps netlist elements onto a [`MnaSystem`], producing the DC
//! formulation `G·x = e` and the transient companion matrix `C`.

use nalgebra::DVector;

use crate::netlist::Netlist;
use crate::node_table::NodeId;
use crate::system::{DenseSystem, MnaSystem, SparseSystem, SparseTriplets};

/// Row/column layout of the assembled system: non-ground node rows, then
/// one branch row per voltage source, then one branch row per inductor.
#[derive(Debug, Clone, Copy)]
pub struct MnaLayout {
    pub num_nodes: usize,
    pub num_voltage_sources: usize,
    pub num_inductors: usize,
    pub n: usize,
}

impl MnaLayout {
    pub fn new(num_nodes: usize, num_voltage_sources: usize, num_inductors: usize) -> Self {
        let n = (num_nodes - 1) + num_voltage_sources + num_inductors;
        MnaLayout {
            num_nodes,
            num_voltage_sources,
            num_inductors,
            n,
        }
    }

    pub fn from_netlist(netlist: &Netlist, num_nodes: usize) -> Self {
        MnaLayout::new(
            num_nodes,
            netlist.num_voltage_sources(),
            netlist.num_inductors(),
        )
    }

    /// Row index for a node, or `None` if it is ground (ground has no row).
    pub fn node_row(&self, node_id: NodeId) -> Option<usize> {
        if node_id == 0 {
            None
        } else {
            Some(node_id - 1)
        }
    }

    pub fn voltage_branch_row(&self, k: usize) -> usize {
        (self.num_nodes - 1) + k
    }

    pub fn inductor_branch_row(&self, k: usize) -> usize {
        (self.num_nodes - 1) + self.num_voltage_sources + k
    }
}

/// A sink that stamps collect contributions into, abstracting over dense
/// direct indexing and sparse triplet accumulation.
trait StampSink {
    fn add(&mut self, row: usize, col: usize, value: f64);
    fn add_rhs(&mut self, row: usize, value: f64);
    fn set_rhs(&mut self, row: usize, value: f64);
}

struct DenseSink<'a> {
    a: &'a mut nalgebra::DMatrix<f64>,
    b: &'a mut DVector<f64>,
}

impl<'a> StampSink for DenseSink<'a> {
    fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[(row, col)] += value;
    }
    fn add_rhs(&mut self, row: usize, value: f64) {
        self.b[row] += value;
    }
    fn set_rhs(&mut self, row: usize, value: f64) {
        self.b[row] = value;
    }
}

struct SparseSink<'a> {
    triplets: &'a mut SparseTriplets,
    b: &'a mut DVector<f64>,
}

impl<'a> StampSink for SparseSink<'a> {
    fn add(&mut self, row: usize, col: usize, value: f64) {
        self.triplets.push(row, col, value);
    }
    fn add_rhs(&mut self, row: usize, value: f64) {
        self.b[row] += value;
    }
    fn set_rhs(&mut self, row: usize, value: f64) {
        self.b[row] = value;
    }
}

fn stamp_passive<S: StampSink>(sink: &mut S, layout: &MnaLayout, p: NodeId, n: NodeId, g: f64) {
    let pr = layout.node_row(p);
    let nr = layout.node_row(n);
    if let Some(pr) = pr {
        sink.add(pr, pr, g);
    }
    if let Some(nr) = nr {
        sink.add(nr, nr, g);
    }
    if let (Some(pr), Some(nr)) = (pr, nr) {
        sink.add(pr, nr, -g);
        sink.add(nr, pr, -g);
    }
}

fn stamp_current_source<S: StampSink>(sink: &mut S, layout: &MnaLayout, p: NodeId, n: NodeId, value: f64) {
    if let Some(pr) = layout.node_row(p) {
        sink.add_rhs(pr, -value);
    }
    if let Some(nr) = layout.node_row(n) {
        sink.add_rhs(nr, value);
    }
}

fn stamp_branch<S: StampSink>(
    sink: &mut S,
    layout: &MnaLayout,
    p: NodeId,
    n: NodeId,
    branch_row: usize,
    value: f64,
) {
    if let Some(pr) = layout.node_row(p) {
        sink.add(branch_row, pr, 1.0);
        sink.add(pr, branch_row, 1.0);
    }
    if let Some(nr) = layout.node_row(n) {
        sink.add(branch_row, nr, -1.0);
        sink.add(nr, branch_row, -1.0);
    }
    sink.set_rhs(branch_row, value);
}

/// Assembles the DC system `G·x = e`: resistors, current sources, voltage
/// sources, and inductors (as zero-volt branches). Capacitors are open at
/// DC and are not stamped here.
pub fn assemble_dc(netlist: &Netlist, num_nodes: usize, sparse: bool) -> (MnaSystem, MnaLayout) {
    let layout = MnaLayout::from_netlist(netlist, num_nodes);
    let n = layout.n;

    if sparse {
        let capacity = 4 * (netlist.num_resistors() + netlist.num_voltage_sources() + netlist.num_inductors());
        let mut triplets = SparseTriplets::with_capacity(n, capacity);
        let mut b = DVector::zeros(n);
        {
            let mut sink = SparseSink {
                triplets: &mut triplets,
                b: &mut b,
            };
            stamp_dc_elements(&mut sink, &layout, netlist);
        }
        let a = triplets.into_csmat();
        let mut sys = SparseSystem::new(a, n);
        sys.b = b;
        (MnaSystem::Sparse(sys), layout)
    } else {
        let mut sys = DenseSystem::zeros(n);
        {
            let (a, b) = (&mut sys.a, &mut sys.b);
            let mut sink = DenseSink { a, b };
            stamp_dc_elements(&mut sink, &layout, netlist);
        }
        (MnaSystem::Dense(sys), layout)
    }
}

fn stamp_dc_elements<S: StampSink>(sink: &mut S, layout: &MnaLayout, netlist: &Netlist) {
    for r in netlist.resistors.iter() {
        stamp_passive(sink, layout, r.pos, r.neg, 1.0 / r.value);
    }
    for i in netlist.current_sources.iter() {
        stamp_current_source(sink, layout, i.pos, i.neg, i.dc_value);
    }
    for (k, v) in netlist.voltage_sources.iter().enumerate() {
        let row = layout.voltage_branch_row(k);
        stamp_branch(sink, layout, v.pos, v.neg, row, v.dc_value);
    }
    for (k, l) in netlist.inductors.iter().enumerate() {
        let row = layout.inductor_branch_row(k);
        stamp_branch(sink, layout, l.pos, l.neg, row, 0.0);
    }
}

/// Assembles the transient companion matrix `C`: capacitors get the same
/// four-point stamp as resistors (magnitude `C_val` instead of `1/R`), and
/// each inductor contributes `C[r,r] -= L_val` at its own branch row.
pub fn assemble_companion(netlist: &Netlist, layout: &MnaLayout, sparse: bool) -> MnaSystem {
    let n = layout.n;

    if sparse {
        let capacity = 4 * netlist.num_capacitors() + netlist.num_inductors();
        let mut triplets = SparseTriplets::with_capacity(n, capacity);
        let mut b = DVector::zeros(n);
        {
            let mut sink = SparseSink {
                triplets: &mut triplets,
                b: &mut b,
            };
            stamp_companion_elements(&mut sink, layout, netlist);
        }
        let a = triplets.into_csmat();
        MnaSystem::Sparse(SparseSystem::new(a, n))
    } else {
        let mut sys = DenseSystem::zeros(n);
        {
            let (a, b) = (&mut sys.a, &mut sys.b);
            let mut sink = DenseSink { a, b };
            stamp_companion_elements(&mut sink, layout, netlist);
        }
        MnaSystem::Dense(sys)
    }
}

fn stamp_companion_elements<S: StampSink>(sink: &mut S, layout: &MnaLayout, netlist: &Netlist) {
    for c in netlist.capacitors.iter() {
        stamp_passive(sink, layout, c.pos, c.neg, c.value);
    }
    for (k, l) in netlist.inductors.iter().enumerate() {
        let row = layout.inductor_branch_row(k);
        sink.add(row, row, -l.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::{Netlist, Passive, Source};

    fn divider_netlist() -> Netlist {
        let mut netlist = Netlist::new("divider".into());
        netlist
            .add_resistor(Passive {
                name: "R1".into(),
                pos: 1,
                neg: 0,
                value: 1000.0,
            })
            .unwrap();
        netlist
            .add_voltage_source(Source {
                name: "V1".into(),
                pos: 1,
                neg: 0,
                dc_value: 5.0,
                waveform: None,
            })
            .unwrap();
        netlist
    }

    #[test]
    fn resistor_stamp_is_symmetric_and_ground_skipped() {
        let netlist = divider_netlist();
        let (sys, layout) = assemble_dc(&netlist, 2, false);
        match sys {
            MnaSystem::Dense(d) => {
                assert_eq!(layout.n, 2); // 1 node row + 1 voltage branch row
                assert!((d.a[(0, 0)] - 0.001).abs() < 1e-12);
            }
            _ => panic!("expected dense"),
        }
    }

    #[test]
    fn voltage_source_branch_stamp() {
        let netlist = divider_netlist();
        let (sys, layout) = assemble_dc(&netlist, 2, false);
        let r = layout.voltage_branch_row(0);
        match sys {
            MnaSystem::Dense(d) => {
                assert_eq!(d.a[(r, 0)], 1.0);
                assert_eq!(d.a[(0, r)], 1.0);
                assert_eq!(d.b[r], 5.0);
            }
            _ => panic!("expected dense"),
        }
    }

    #[test]
    fn sparse_and_dense_assembly_agree() {
        let netlist = divider_netlist();
        let (dense, layout) = assemble_dc(&netlist, 2, false);
        let (sparse, _) = assemble_dc(&netlist, 2, true);
        let r = layout.voltage_branch_row(0);
        if let (MnaSystem::Dense(d), MnaSystem::Sparse(s)) = (dense, sparse) {
            assert_eq!(d.a[(0, 0)], crate::system::sparse_get(&s.a, 0, 0));
            assert_eq!(d.a[(r, 0)], crate::system::sparse_get(&s.a, r, 0));
            assert_eq!(d.b[r], s.b[r]);
        } else {
            panic!("expected one dense, one sparse");
        }
    }

    #[test]
    fn inductor_is_zero_volt_branch_at_dc() {
        let mut netlist = Netlist::new("rl".into());
        netlist
            .add_voltage_source(Source {
                name: "V1".into(),
                pos: 1,
                neg: 0,
                dc_value: 5.0,
                waveform: None,
            })
            .unwrap();
        netlist
            .add_inductor(Passive {
                name: "L1".into(),
                pos: 1,
                neg: 0,
                value: 1e-3,
            })
            .unwrap();
        let (sys, layout) = assemble_dc(&netlist, 2, false);
        let lrow = layout.inductor_branch_row(0);
        match sys {
            MnaSystem::Dense(d) => {
                assert_eq!(d.b[lrow], 0.0);
                assert_eq!(d.a[(lrow, 0)], 1.0);
            }
            _ => panic!("expected dense"),
        }
    }
}
