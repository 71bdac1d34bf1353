fn main() -> anyhow::Result<()> {
    steptrack_lib::run()
}
