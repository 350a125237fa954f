use kube::CustomResourceExt;
use perftest_types::*;
use std::fs;

fn main() {
    let _ = fs::create_dir("../crds");
    let crds = [
        ("fio", Fio::crd()),
        ("iperf", IPerf::crd()),
        ("rdmabandwidth", RDMABandwidth::crd()),
        ("rdmalatency", RDMALatency::crd()),
        ("mpipingpong", MPIPingPong::crd()),
        ("openfoam", OpenFOAM::crd()),
        ("pytorch", PyTorch::crd()),
        ("benchmarkset", BenchmarkSet::crd()),
    ];
    for (name, crd) in crds {
        fs::write(
            format!("../crds/perftest.stackhpc.com_{}_crd.yaml", name),
            serde_yaml::to_string(&crd).unwrap(),
        )
        .unwrap();
    }
}
