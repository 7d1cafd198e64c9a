#[rocket::launch]
fn rocket() -> _ {
    room_relay::rocket()
}
