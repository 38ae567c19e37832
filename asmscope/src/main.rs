fn main() -> anyhow::Result<()> {
    asmscope::run(asmscope::kernels::registry)
}
