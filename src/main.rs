fn main() {
    physio_recorder_lib::run()
}
